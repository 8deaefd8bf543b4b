pub mod prelude;

pub mod accounts;

//! Integration tests for the account lifecycle against a real SQLite file.
//!
//! Covers creation, authentication, conditional rehashing, uniqueness under
//! concurrency and usage telemetry.

use futures::future::join_all;
use propcast::config::{Config, SecurityConfig};
use propcast::db::{Store, UniqueField};
use propcast::domain::{AccountId, Role, UsageKind};
use propcast::entities::accounts;
use propcast::models::account::{AccountDraft, AccountPatch, Password};
use propcast::services::password::verify;
use propcast::services::{AccountError, AccountService, SeaOrmAccountService};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

async fn spawn_service() -> SeaOrmAccountService {
    let db_path =
        std::env::temp_dir().join(format!("propcast-account-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.security = SecurityConfig {
        argon2_memory_cost_kib: 1024,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
    };

    let store = Store::new(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("Failed to open store");

    SeaOrmAccountService::from_config(store, &config).expect("Failed to build service")
}

fn alice() -> AccountDraft {
    AccountDraft::new("alice", "ALICE@X.COM", "Secret123")
}

#[tokio::test]
async fn create_then_authenticate_end_to_end() {
    let service = spawn_service().await;

    let account = service.create_account(alice()).await.unwrap();
    assert_eq!(account.username, "alice");
    assert_eq!(account.email, "alice@x.com");
    assert_eq!(account.role, Role::Standard);
    assert_eq!(account.usage_stats.predictions_made, 0);
    assert_eq!(account.usage_stats.models_trained, 0);
    assert!(account.usage_stats.last_active.is_none());
    assert!(account.api_key.is_none());
    assert!(account.created_at <= account.updated_at);

    let authed = service.authenticate("alice", "Secret123").await.unwrap();
    assert_eq!(authed.id, account.id);

    let err = service.authenticate("alice", "wrong").await.unwrap_err();
    assert!(matches!(err, AccountError::InvalidCredentials));
}

#[tokio::test]
async fn stored_hash_is_never_the_plaintext() {
    let service = spawn_service().await;
    let account = service.create_account(alice()).await.unwrap();

    assert_ne!(account.password_hash, "Secret123");
    assert_ne!(account.password_hash.len(), "Secret123".len());
    assert!(account.password_hash.starts_with("$argon2id$"));
}

#[tokio::test]
async fn authenticate_is_case_sensitive_on_password() {
    let service = spawn_service().await;
    service.create_account(alice()).await.unwrap();

    for attempt in ["secret123", "SECRET123", "Secret123 ", ""] {
        let err = service.authenticate("alice", attempt).await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidCredentials), "{attempt:?}");
    }
}

#[tokio::test]
async fn authenticate_accepts_email_identifier() {
    let service = spawn_service().await;
    let account = service.create_account(alice()).await.unwrap();

    let authed = service
        .authenticate("Alice@X.com", "Secret123")
        .await
        .unwrap();
    assert_eq!(authed.id, account.id);
}

#[tokio::test]
async fn unknown_identifier_reads_as_invalid_credentials() {
    let service = spawn_service().await;
    service.create_account(alice()).await.unwrap();

    let unknown = service.authenticate("mallory", "Secret123").await.unwrap_err();
    let wrong = service.authenticate("alice", "nope").await.unwrap_err();

    assert!(matches!(unknown, AccountError::InvalidCredentials));
    assert_eq!(unknown.to_string(), wrong.to_string());
}

#[tokio::test]
async fn malformed_stored_hash_fails_authentication() {
    let service = spawn_service().await;
    let account = service.create_account(alice()).await.unwrap();

    accounts::Entity::update_many()
        .col_expr(accounts::Column::PasswordHash, Expr::value("not-a-phc-string"))
        .filter(accounts::Column::Id.eq(account.id.value()))
        .exec(&service.store().conn)
        .await
        .unwrap();

    let err = service.authenticate("alice", "Secret123").await.unwrap_err();
    assert!(matches!(err, AccountError::InvalidCredentials));
}

#[tokio::test]
async fn email_is_normalized_and_unique_case_insensitively() {
    let service = spawn_service().await;

    let first = service
        .create_account(AccountDraft::new("foo", "Foo@Bar.com", "pw-one"))
        .await
        .unwrap();
    assert_eq!(first.email, "foo@bar.com");

    let err = service
        .create_account(AccountDraft::new("foo2", "FOO@BAR.COM", "pw-two"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AccountError::Duplicate {
            field: UniqueField::Email
        }
    ));
}

#[tokio::test]
async fn username_is_trimmed_and_case_sensitive() {
    let service = spawn_service().await;

    let account = service
        .create_account(AccountDraft::new("  alice  ", "a1@x.com", "pw"))
        .await
        .unwrap();
    assert_eq!(account.username, "alice");

    let err = service
        .create_account(AccountDraft::new("alice", "a2@x.com", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AccountError::Duplicate {
            field: UniqueField::Username
        }
    ));

    // Different case is a different username.
    service
        .create_account(AccountDraft::new("Alice", "a3@x.com", "pw"))
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_creates_with_same_username_yield_one_winner() {
    let service = spawn_service().await;

    let attempts = (0..8).map(|i| {
        let service = service.clone();
        async move {
            service
                .create_account(AccountDraft::new(
                    "contested",
                    format!("user{i}@x.com"),
                    "pw",
                ))
                .await
        }
    });

    let results = join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);

    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(AccountError::Duplicate {
                field: UniqueField::Username
            })
        ));
    }
}

#[tokio::test]
async fn concurrent_creates_with_case_variant_emails_yield_one_winner() {
    let service = spawn_service().await;

    let attempts = [("first", "X@Y.com"), ("second", "x@y.com")].map(|(username, email)| {
        let service = service.clone();
        async move {
            service
                .create_account(AccountDraft::new(username, email, "pw"))
                .await
        }
    });

    let results = join_all(attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let duplicates = results
        .iter()
        .filter(|r| {
            matches!(
                r,
                Err(AccountError::Duplicate {
                    field: UniqueField::Email
                })
            )
        })
        .count();
    assert_eq!(duplicates, 1);
}

#[tokio::test]
async fn role_defaults_and_rejects_unknown_values() {
    let service = spawn_service().await;

    let mut draft = AccountDraft::new("carol", "carol@x.com", "pw");
    draft.role = Some("analyst".to_string().into());
    let account = service.create_account(draft).await.unwrap();
    assert_eq!(account.role, Role::Analyst);

    let mut draft = AccountDraft::new("dave", "dave@x.com", "pw");
    draft.role = Some("superuser".to_string().into());
    let err = service.create_account(draft).await.unwrap_err();
    let AccountError::Validation(errors) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field(), "role");
    assert_eq!(errors[0].reason(), "invalid_enum");
}

#[tokio::test]
async fn validation_failure_persists_nothing() {
    let service = spawn_service().await;

    let draft = AccountDraft {
        username: Some("erin".to_string().into()),
        email: Some("not-an-email".to_string().into()),
        password: None,
        ..AccountDraft::default()
    };
    let err = service.create_account(draft).await.unwrap_err();
    let AccountError::Validation(errors) = err else {
        panic!("expected validation error, got {err:?}");
    };
    let fields: Vec<_> = errors.iter().map(|e| e.field()).collect();
    assert_eq!(fields, vec!["email", "password"]);

    assert!(matches!(
        service.find_by_username("erin").await,
        Err(AccountError::NotFound)
    ));
}

#[tokio::test]
async fn unrelated_update_keeps_hash_byte_identical() {
    let service = spawn_service().await;
    let before = service.create_account(alice()).await.unwrap();

    let patch = AccountPatch {
        profile: Some(json!({ "phone": "555-0100", "organization": "Acme Realty" })),
        role: Some("admin".to_string().into()),
        email: Some("alice@new.example.com".to_string().into()),
        ..AccountPatch::default()
    };
    let after = service.update_account(before.id, patch).await.unwrap();

    assert_eq!(after.password_hash, before.password_hash);
    assert_eq!(after.role, Role::Admin);
    assert_eq!(after.email, "alice@new.example.com");
    let profile = after.profile.unwrap();
    assert_eq!(profile.phone.as_deref(), Some("555-0100"));
    assert_eq!(profile.organization.as_deref(), Some("Acme Realty"));
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);

    service.authenticate("alice", "Secret123").await.unwrap();
}

#[tokio::test]
async fn password_update_rehashes() {
    let service = spawn_service().await;
    let before = service.create_account(alice()).await.unwrap();

    let patch = AccountPatch {
        password: Some(Password::new("N3wSecret!").into()),
        ..AccountPatch::default()
    };
    let after = service.update_account(before.id, patch).await.unwrap();

    assert_ne!(after.password_hash, before.password_hash);
    assert!(verify("N3wSecret!", &after.password_hash));
    assert!(!verify("Secret123", &after.password_hash));

    service.authenticate("alice", "N3wSecret!").await.unwrap();
    assert!(service.authenticate("alice", "Secret123").await.is_err());
}

#[tokio::test]
async fn resubmitting_the_same_password_still_rehashes() {
    let service = spawn_service().await;
    let before = service.create_account(alice()).await.unwrap();

    let patch = AccountPatch {
        password: Some(Password::new("Secret123").into()),
        ..AccountPatch::default()
    };
    let after = service.update_account(before.id, patch).await.unwrap();

    assert_ne!(after.password_hash, before.password_hash);
    assert!(verify("Secret123", &after.password_hash));
}

#[tokio::test]
async fn profile_patch_overlays_existing_fields() {
    let service = spawn_service().await;

    let mut draft = alice();
    draft.profile = Some(json!({ "first_name": "Alice", "last_name": "Liddell" }));
    draft.preferences = Some(json!({
        "default_model": "gradient_boosting",
        "notification_settings": { "email": true }
    }));
    let account = service.create_account(draft).await.unwrap();

    let patch = AccountPatch {
        profile: Some(json!({ "phone": "555-0100" })),
        preferences: Some(json!({ "notification_settings": { "sms": false } })),
        ..AccountPatch::default()
    };
    let updated = service.update_account(account.id, patch).await.unwrap();

    let profile = updated.profile.unwrap();
    assert_eq!(profile.first_name.as_deref(), Some("Alice"));
    assert_eq!(profile.last_name.as_deref(), Some("Liddell"));
    assert_eq!(profile.phone.as_deref(), Some("555-0100"));

    let preferences = updated.preferences.unwrap();
    assert_eq!(preferences.default_model.as_deref(), Some("gradient_boosting"));
    assert_eq!(preferences.notification_settings.get("email"), Some(&true));
    assert_eq!(preferences.notification_settings.get("sms"), Some(&false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_patches_to_different_profile_fields_both_land() {
    let service = spawn_service().await;
    let account = service.create_account(alice()).await.unwrap();

    for round in 0..40 {
        let first_name = format!("A{round}");
        let phone = format!("555-{round:04}");

        let (a, b) = tokio::join!(
            tokio::spawn({
                let service = service.clone();
                let id = account.id;
                let first_name = first_name.clone();
                async move {
                    service
                        .update_account(
                            id,
                            AccountPatch {
                                profile: Some(json!({ "first_name": first_name })),
                                ..AccountPatch::default()
                            },
                        )
                        .await
                }
            }),
            tokio::spawn({
                let service = service.clone();
                let id = account.id;
                let phone = phone.clone();
                async move {
                    service
                        .update_account(
                            id,
                            AccountPatch {
                                profile: Some(json!({ "phone": phone })),
                                ..AccountPatch::default()
                            },
                        )
                        .await
                }
            })
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let profile = service
            .get_account(account.id)
            .await
            .unwrap()
            .profile
            .unwrap();
        assert_eq!(profile.first_name.as_deref(), Some(first_name.as_str()), "round {round}");
        assert_eq!(profile.phone.as_deref(), Some(phone.as_str()), "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_notification_patches_merge_channels() {
    let service = spawn_service().await;
    let account = service.create_account(alice()).await.unwrap();

    let id = account.id;
    let channels = ["email", "sms", "push", "slack", "webhook", "digest"];
    let patches = channels.map(|channel| {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .update_account(
                    id,
                    AccountPatch {
                        preferences: Some(json!({ "notification_settings": { channel: true } })),
                        ..AccountPatch::default()
                    },
                )
                .await
        })
    });
    for result in join_all(patches).await {
        result.unwrap().unwrap();
    }

    let preferences = service
        .get_account(account.id)
        .await
        .unwrap()
        .preferences
        .unwrap();
    for channel in channels {
        assert_eq!(
            preferences.notification_settings.get(channel),
            Some(&true),
            "{channel}"
        );
    }
}

#[tokio::test]
async fn update_into_taken_username_is_a_duplicate() {
    let service = spawn_service().await;
    service.create_account(alice()).await.unwrap();
    let bob = service
        .create_account(AccountDraft::new("bob", "bob@x.com", "pw"))
        .await
        .unwrap();

    let patch = AccountPatch {
        username: Some("alice".to_string().into()),
        ..AccountPatch::default()
    };
    let err = service.update_account(bob.id, patch).await.unwrap_err();
    assert!(matches!(
        err,
        AccountError::Duplicate {
            field: UniqueField::Username
        }
    ));

    let unchanged = service.get_account(bob.id).await.unwrap();
    assert_eq!(unchanged.username, "bob");
}

#[tokio::test]
async fn update_and_usage_on_missing_account_are_not_found() {
    let service = spawn_service().await;
    let ghost = AccountId::generate();

    let err = service
        .update_account(ghost, AccountPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::NotFound));

    let err = service
        .record_usage(ghost, UsageKind::PredictionsMade)
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::NotFound));

    assert!(matches!(
        service.get_account(ghost).await,
        Err(AccountError::NotFound)
    ));
}

#[tokio::test]
async fn concurrent_usage_increments_are_not_lost() {
    let service = spawn_service().await;
    let account = service.create_account(alice()).await.unwrap();

    let increments = (0..100).map(|_| {
        let service = service.clone();
        async move {
            service
                .record_usage(account.id, UsageKind::PredictionsMade)
                .await
        }
    });
    for result in join_all(increments).await {
        result.unwrap();
    }

    let after = service.get_account(account.id).await.unwrap();
    assert_eq!(after.usage_stats.predictions_made, 100);
    assert_eq!(after.usage_stats.models_trained, 0);
    assert!(after.usage_stats.last_active.is_some());
    assert_eq!(after.password_hash, account.password_hash);
}

#[tokio::test]
async fn updates_do_not_clobber_concurrent_increments() {
    let service = spawn_service().await;
    let account = service.create_account(alice()).await.unwrap();

    let increments = (0..50).map(|_| {
        let service = service.clone();
        async move {
            service
                .record_usage(account.id, UsageKind::ModelsTrained)
                .await
        }
    });
    let update = service.update_account(
        account.id,
        AccountPatch {
            profile: Some(json!({ "organization": "Acme Realty" })),
            ..AccountPatch::default()
        },
    );

    let (results, updated) = tokio::join!(join_all(increments), update);
    updated.unwrap();
    for result in results {
        result.unwrap();
    }

    let after = service.get_account(account.id).await.unwrap();
    assert_eq!(after.usage_stats.models_trained, 50);
}

#[tokio::test]
async fn detached_usage_recording_completes() {
    let service = spawn_service().await;
    let account = service.create_account(alice()).await.unwrap();

    let handle = service.record_usage_detached(account.id, UsageKind::ModelsTrained);
    handle.await.unwrap();

    let after = service.get_account(account.id).await.unwrap();
    assert_eq!(after.usage_stats.models_trained, 1);
    assert!(after.usage_stats.last_active.is_some());

    // Unknown ids are logged, not propagated.
    service
        .record_usage_detached(AccountId::generate(), UsageKind::ModelsTrained)
        .await
        .unwrap();
}

#![allow(dead_code)]

use std::time::Duration;

use exitlink::config::Config;
use exitlink::error::{AppError, DomainError};
use exitlink::models::link::{ContentType, LinkOptions};
use exitlink::services::links::NewLinkRequest;
use exitlink::state::AppState;
use uuid::Uuid;

pub const MASTER_KEY: [u8; 32] = [7u8; 32];

pub fn test_config() -> Config {
    let mut config = Config::with_defaults(MASTER_KEY);
    config.io_timeout = Duration::from_secs(5);
    config
}

pub fn app_state() -> AppState {
    AppState::in_memory(test_config())
}

/// A wallet holding exactly `credits` credits.
pub async fn wallet_with(state: &AppState, credits: i64) -> Uuid {
    let created = state.wallets.create().await.unwrap();
    let bonus = created.balance;
    if credits > bonus {
        state
            .ledger
            .credit(created.wallet_id, credits - bonus, "Test top-up")
            .await
            .unwrap();
    } else if credits < bonus {
        state
            .ledger
            .debit(created.wallet_id, bonus - credits, "Test drain")
            .await
            .unwrap();
    }
    created.wallet_id
}

pub fn text_request(text: &str, options: LinkOptions) -> NewLinkRequest {
    NewLinkRequest {
        content: text.as_bytes().to_vec(),
        content_type: ContentType::Text,
        file_name: None,
        options,
    }
}

pub fn file_request(bytes: Vec<u8>, name: &str, options: LinkOptions) -> NewLinkRequest {
    NewLinkRequest {
        content: bytes,
        content_type: ContentType::File,
        file_name: Some(name.to_string()),
        options,
    }
}

pub fn views(max: u32) -> LinkOptions {
    LinkOptions {
        max_views: Some(max),
        ..Default::default()
    }
}

pub fn is_domain(err: &AppError, expected: DomainError) -> bool {
    matches!(err, AppError::Domain(actual) if *actual == expected)
}

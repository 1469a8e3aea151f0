//! Self-destructing links paid for with prepaid credits.

pub mod config;
pub mod db;
pub mod error;
pub mod router;
pub mod state;

pub mod crypto {
    pub mod aes;
    pub mod csrf;
    pub mod ids;
    pub mod kek;
    pub mod password;
    pub mod phrase;
}

pub mod models {
    pub mod ledger;
    pub mod link;
    pub mod session;
    pub mod wallet;
}

pub mod repositories;

pub mod storage {
    pub mod blob;
    pub mod ephemeral;
}

pub mod services {
    pub mod bounded;
    pub mod key_vault;
    pub mod ledger;
    pub mod lifecycle;
    pub mod links;
    pub mod pricing;
    pub mod sessions;
    pub mod wallets;
}

pub mod handlers {
    pub mod credits;
    pub mod health;
    pub mod links;
    pub mod wallet;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod csrf;
    pub mod rate_limit;
}

pub mod validation {
    pub mod links;
}

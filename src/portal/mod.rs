//! Client side of the storefront portal: a legacy server-rendered application
//! with no token endpoint. Everything needed to talk to it is scraped from
//! the pages it serves.

pub mod client;
pub mod extract;
pub mod fetch;
pub mod session;

pub use client::PortalClient;
pub use extract::{extract_ajax_token, parse_session_cookie, LoginForm};
pub use fetch::{ProductFetcher, ProductSource};
pub use session::SessionManager;

/// Element ids of the hidden inputs carried by the login page.
pub const INSTANCE_FIELD: &str = "pInstance";
pub const SUBMISSION_FIELD: &str = "pPageSubmissionId";
pub const CHECKSUM_FIELD: &str = "pPageChecksum";

/// Form fields the login page submits the credentials under.
pub const USERNAME_FIELD: &str = "P101_USERNAME";
pub const PASSWORD_FIELD: &str = "P101_PASSWORD";

pub const LOGIN_REQUEST: &str = "LOGIN";
pub const ACCEPT_PATH: &str = "wwv_flow.accept";
pub const AJAX_PATH: &str = "wwv_flow.ajax";

/// Argument names of the product lookup process, in the order it expects them.
pub const STORE_ARG: &str = "P1_STORE";
pub const CODE_ARG: &str = "P1_CODE";
pub const MODE_ARG: &str = "P1_MODE";
pub const LOOKUP_MODE: &str = "CODE";

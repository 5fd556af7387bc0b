/// Application name
pub const APP_NAME: &str = "Lumen";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 5001;

/// Username length bounds (characters)
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 30;

/// Minimum password length (characters)
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Maximum bio length (characters)
pub const MAX_BIO_LENGTH: usize = 500;

/// Maximum post caption length (characters)
pub const MAX_CAPTION_LENGTH: usize = 2_200;

/// Maximum comment length (characters)
pub const MAX_COMMENT_LENGTH: usize = 1_000;

/// Maximum direct message length (characters)
pub const MAX_MESSAGE_LENGTH: usize = 4_000;

/// Notifications returned by the listing endpoint, newest first
pub const NOTIFICATION_LIMIT: u32 = 50;

/// Search result caps
pub const SEARCH_USER_LIMIT: u32 = 10;
pub const SEARCH_POST_LIMIT: u32 = 20;

/// Posts returned by the explore endpoint
pub const EXPLORE_LIMIT: u32 = 50;

/// Per-connection outbound event queue depth. Events for a connection whose
/// queue is full are dropped.
pub const CONNECTION_QUEUE_DEPTH: usize = 256;

/// Capacity of the server-wide broadcast channel
pub const BROADCAST_CAPACITY: usize = 1024;

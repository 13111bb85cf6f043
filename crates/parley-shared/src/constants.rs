/// Application name
pub const APP_NAME: &str = "Parley";

/// Websocket endpoint path
pub const WS_PATH: &str = "/ws";

/// Default HTTP / websocket port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default capacity of each connection's outbound queue
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// Event names
pub const EVENT_CHAT: &str = "chat";
pub const EVENT_READ: &str = "read";
pub const EVENT_TYPING: &str = "typing";
pub const EVENT_STOP_TYPING: &str = "stopTyping";
pub const EVENT_GET_CHATS: &str = "getChats";
pub const EVENT_GET_NOTIF: &str = "getNotif";
pub const EVENT_ONLINE: &str = "online";
pub const EVENT_OFFLINE: &str = "offline";
pub const EVENT_ONLINE_USERS: &str = "onlineUsers";

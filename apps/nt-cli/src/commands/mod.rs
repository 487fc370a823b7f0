pub mod case;
pub mod dispatch;
pub mod feed;
pub mod protocolist;
pub mod watch;

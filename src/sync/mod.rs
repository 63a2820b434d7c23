//! Per-user state kept in step with the remote gateway
//!
//! A [`SessionContext`] owns the signed-in identity together with the
//! [`WatchlistStore`] and [`NotificationFeed`] scoped to it.

pub mod notifications;
pub mod projection;
pub mod registry;
pub mod session;
pub mod watchlist;

pub use notifications::{FeedSubscription, NotificationFeed};
pub use projection::{FeedEvent, NotificationProjection, Toggle, WatchlistEvent, WatchlistProjection};
pub use registry::SessionRegistry;
pub use session::SessionContext;
pub use watchlist::WatchlistStore;

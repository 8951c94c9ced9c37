//! Domain models for the lot auction backend.
//!
//! Lots live in a persistent library; an auction projects them into an ordered
//! working set of `SessionLot`s and logs everything it does as `HistoryRecord`s.

pub mod auction;
pub mod history;
pub mod lot;
pub mod session_lot;

pub use auction::{Auction, AuctionEvent, AuctionMode, AuctionSettings, AuctionStatus, SubMode};
pub use history::{HistoryRecord, NewHistoryRecord};
pub use lot::{Lot, LotCategory, NewLot};
pub use session_lot::{LotOrder, SessionLot};

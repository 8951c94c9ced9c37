pub mod auction_service;

pub use auction_service::{AuctionService, RoundReport, MAX_PAGE_SIZE};

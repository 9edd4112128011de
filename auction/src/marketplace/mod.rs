pub mod auction;

pub use auction::{Auction, AuctionStatus};

//! Marketplace listings for Kisu.
//!
//! Listings are small JSON records kept in [`DatabaseMap`](kisu_dbmap::DatabaseMap)s
//! named `market:<page>`, 27 to a page. The listed item itself is kept in a
//! [`QuickItemDatabase`](kisu_qidb::QuickItemDatabase) under the listing's
//! five-character code. Seller balances live in a record map of their own.
//!
//! # Modules
//!
//! - [`error`] -- Error types for marketplace operations
//! - [`product`] -- The stored listing record
//! - [`code`] -- Random listing codes
//! - [`page`] -- Page numbering
//! - [`expiry`] -- Listing lifetime
//! - [`market`] -- Listing, editing, queries and balances

pub mod code;
pub mod error;
pub mod expiry;
pub mod market;
pub mod page;
pub mod product;

pub use error::{MarketError, MarketResult};
pub use expiry::{remaining_time, RemainingTime};
pub use market::{item_store_config, Listing, Market, ProductQuery, BALANCE_MAP_ID, ITEM_NAMESPACE};
pub use page::{page_for, LISTINGS_PER_PAGE};
pub use product::{PriceChange, ProductData};

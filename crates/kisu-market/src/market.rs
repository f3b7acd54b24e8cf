//! The marketplace: listing records in page maps, items in the item store,
//! and seller balances.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};

use kisu_dbmap::{map_ids, DatabaseMap};
use kisu_host::{HostBindings, PropertyStore};
use kisu_qidb::{ItemDatabaseConfig, QuickItemDatabase};
use kisu_types::ItemStack;

use crate::code::{random_code, CODE_LENGTH};
use crate::error::{MarketError, MarketResult};
use crate::page::{page_for, page_id, parse_page_id, PAGE_PREFIX};
use crate::product::ProductData;

/// Item store namespace for listed items.
pub const ITEM_NAMESPACE: &str = "it_market";
pub const ITEM_CACHE_SIZE: usize = 5;
pub const ITEM_SAVE_RATE: usize = 1;

/// Record map holding seller balances.
pub const BALANCE_MAP_ID: &str = "money";

/// Item store configuration used by [`Market::open`].
pub fn item_store_config() -> ItemDatabaseConfig {
    ItemDatabaseConfig::new(ITEM_NAMESPACE)
        .with_cache_size(ITEM_CACHE_SIZE)
        .with_save_rate(ITEM_SAVE_RATE)
}

/// A listing together with where it is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listing {
    pub page: u32,
    pub code: String,
    pub data: ProductData,
}

/// Which listings a query returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProductQuery {
    /// Every listing, hidden ones only if asked for.
    All { include_hidden: bool },
    /// Listings of one seller, hidden ones included.
    Owner(String),
    /// Listings whose item has this type id, with or without namespace.
    TypeId(String),
}

/// Marketplace over a property store and an item store.
pub struct Market {
    properties: Arc<dyn PropertyStore>,
    items: QuickItemDatabase,
    balances: DatabaseMap<i64>,
}

impl Market {
    pub fn new(properties: Arc<dyn PropertyStore>, items: QuickItemDatabase) -> MarketResult<Self> {
        let balances = DatabaseMap::open(properties.clone(), BALANCE_MAP_ID)?;
        Ok(Self {
            properties,
            items,
            balances,
        })
    }

    /// Open the market with its own item store.
    pub fn open(host: &HostBindings) -> MarketResult<Self> {
        let items = QuickItemDatabase::new(item_store_config(), host.clone())?;
        Self::new(host.properties.clone(), items)
    }

    pub fn items(&self) -> &QuickItemDatabase {
        &self.items
    }

    /// The record map of `page`.
    pub fn page(&self, page: u32) -> MarketResult<DatabaseMap<ProductData>> {
        if page == 0 {
            return Err(MarketError::InvalidPage(page));
        }
        Ok(DatabaseMap::open(self.properties.clone(), page_id(page))?)
    }

    /// Every page holding at least one listing, in order.
    pub fn pages(&self) -> MarketResult<Vec<u32>> {
        let mut pages: Vec<u32> = map_ids(&*self.properties, PAGE_PREFIX)?
            .iter()
            .filter_map(|id| parse_page_id(id))
            .collect();
        pages.sort_unstable();
        Ok(pages)
    }

    fn listings(&self) -> MarketResult<Vec<Listing>> {
        let mut listings = Vec::new();
        for page in self.pages()? {
            for (code, data) in &self.page(page)? {
                listings.push(Listing { page, code, data });
            }
        }
        Ok(listings)
    }

    /// Number of listings across all pages.
    pub fn listing_count(&self) -> MarketResult<usize> {
        Ok(self.listings()?.len())
    }

    /// List `item` for sale with a fresh code.
    pub fn add_product(
        &self,
        item: ItemStack,
        owner: &str,
        price: i64,
        now: DateTime<Utc>,
    ) -> MarketResult<Listing> {
        self.add_product_with(&mut rand::thread_rng(), item, owner, price, now)
    }

    /// [`add_product`](Self::add_product) with a caller-supplied RNG.
    pub fn add_product_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        item: ItemStack,
        owner: &str,
        price: i64,
        now: DateTime<Utc>,
    ) -> MarketResult<Listing> {
        if price < 1 {
            return Err(MarketError::InvalidPrice(price));
        }

        let listings = self.listings()?;
        let page = page_for(listings.len() + 1);
        let taken: HashSet<&str> = listings.iter().map(|l| l.code.as_str()).collect();
        let code = random_code(rng, CODE_LENGTH, |c| {
            taken.contains(c) || self.items.quick_has(c)
        });

        let data = ProductData::new(code.clone(), owner, price, now);
        self.page(page)?.set(&code, data.clone())?;
        self.items.set_one(&code, item)?;

        info!(page, code = %code, owner, price, "product listed");
        Ok(Listing { page, code, data })
    }

    /// Delete a listing and its stored item.
    pub fn remove_product(&self, page: u32, code: &str) -> MarketResult<ProductData> {
        let map = self.page(page)?;
        let data = map.get(code).ok_or_else(|| MarketError::NotFound {
            page,
            code: code.to_string(),
        })?;
        self.items.delete(&data.item_key)?;
        map.delete(code)?;
        info!(page, code, "product removed");
        Ok(data)
    }

    /// Write a listing record to a page.
    pub fn set_product(&self, page: u32, code: &str, data: ProductData) -> MarketResult<()> {
        self.page(page)?.set(code, data)?;
        Ok(())
    }

    fn update(
        &self,
        page: u32,
        code: &str,
        f: impl FnOnce(&mut ProductData),
    ) -> MarketResult<ProductData> {
        let map = self.page(page)?;
        let mut data = map.get(code).ok_or_else(|| MarketError::NotFound {
            page,
            code: code.to_string(),
        })?;
        f(&mut data);
        map.set(code, data.clone())?;
        Ok(data)
    }

    /// Flip a listing's visibility. Returns the new hidden state.
    pub fn toggle_hidden(&self, page: u32, code: &str) -> MarketResult<bool> {
        let data = self.update(page, code, |d| d.hidden = !d.hidden)?;
        debug!(page, code, hidden = data.hidden, "visibility toggled");
        Ok(data.hidden)
    }

    /// Change a listing's price.
    pub fn set_price(
        &self,
        page: u32,
        code: &str,
        price: i64,
        now: DateTime<Utc>,
    ) -> MarketResult<ProductData> {
        if price < 1 {
            return Err(MarketError::InvalidPrice(price));
        }
        self.update(page, code, |d| d.reprice(price, now))
    }

    /// The listing with `code`, on whichever page it is.
    pub fn find(&self, code: &str) -> MarketResult<Option<Listing>> {
        Ok(self.listings()?.into_iter().find(|l| l.code == code))
    }

    /// The item of a listing.
    pub fn item(&self, listing: &Listing) -> MarketResult<Option<ItemStack>> {
        Ok(self.items.get_one(&listing.data.item_key)?)
    }

    /// Listings matching `query`, page by page.
    pub fn products(&self, query: &ProductQuery) -> MarketResult<Vec<Listing>> {
        let listings = self.listings()?;
        let matched: Vec<Listing> = match query {
            ProductQuery::All { include_hidden } => listings
                .into_iter()
                .filter(|l| *include_hidden || !l.data.hidden)
                .collect(),
            ProductQuery::Owner(owner) => listings
                .into_iter()
                .filter(|l| &l.data.owner == owner)
                .collect(),
            ProductQuery::TypeId(type_id) => {
                let mut matched = Vec::new();
                for listing in listings {
                    let Some(item) = self.item(&listing)? else {
                        continue;
                    };
                    if item.type_id == *type_id || item.short_type_id() == type_id.as_str() {
                        matched.push(listing);
                    }
                }
                matched
            }
        };
        debug!(?query, matched = matched.len(), "products queried");
        Ok(matched)
    }

    /// Remove every expired listing on `page`. Returns what was removed.
    pub fn purge_expired(&self, page: u32, now: DateTime<Utc>) -> MarketResult<Vec<Listing>> {
        let map = self.page(page)?;
        let mut removed = Vec::new();
        for (code, data) in &map {
            if data.is_expired(now) {
                self.items.delete(&data.item_key)?;
                map.delete(&code)?;
                removed.push(Listing { page, code, data });
            }
        }
        if !removed.is_empty() {
            info!(page, removed = removed.len(), "expired products removed");
        }
        Ok(removed)
    }

    /// Add `amount` to a seller's balance. Returns the new balance.
    pub fn credit(&self, owner: &str, amount: i64) -> MarketResult<i64> {
        let balance = self
            .balance(owner)
            .checked_add(amount)
            .ok_or_else(|| MarketError::BalanceOverflow(owner.to_string()))?;
        self.balances.set(owner, balance)?;
        debug!(owner, amount, balance, "balance credited");
        Ok(balance)
    }

    /// A seller's balance; `0` if they have none.
    pub fn balance(&self, owner: &str) -> i64 {
        self.balances.get(owner).unwrap_or(0)
    }
}

impl std::fmt::Debug for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Market")
            .field("items", &self.items)
            .field("balances", &self.balances)
            .finish_non_exhaustive()
    }
}

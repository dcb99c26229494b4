//! A freight market shared between the trade system and the fleet report.
//!
//! The market is handed to the systems that need it at construction time;
//! there is one per simulation run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Buys cargo at a fixed price and keeps a running tally.
#[derive(Debug)]
pub struct Market {
    price_per_ton: f64,
    revenue_cents: AtomicU64,
    tons_sold: AtomicU64,
}

impl Market {
    /// Open a market paying `price_per_ton`.
    #[must_use]
    pub fn new(price_per_ton: f64) -> Self {
        Self {
            price_per_ton,
            revenue_cents: AtomicU64::new(0),
            tons_sold: AtomicU64::new(0),
        }
    }

    /// Price paid per ton.
    #[must_use]
    pub fn price_per_ton(&self) -> f64 {
        self.price_per_ton
    }

    /// Sell `tons` and return the proceeds.
    pub fn sell(&self, tons: u32) -> f64 {
        let proceeds = f64::from(tons) * self.price_per_ton;
        self.revenue_cents
            .fetch_add((proceeds * 100.0).round() as u64, Ordering::Relaxed);
        self.tons_sold.fetch_add(u64::from(tons), Ordering::Relaxed);
        proceeds
    }

    /// Total proceeds so far.
    #[must_use]
    pub fn revenue(&self) -> f64 {
        self.revenue_cents.load(Ordering::Relaxed) as f64 / 100.0
    }

    /// Total tons sold so far.
    #[must_use]
    pub fn tons_sold(&self) -> u64 {
        self.tons_sold.load(Ordering::Relaxed)
    }
}

// Dashboard read model
//
// Serves the props a dashboard page refreshes after a live update: stats,
// recent loans and recent transactions. A partial reload asks for a subset
// via `only`.

use chrono::Utc;
use lendwise_core::{LendingError, LibraryStats, LibraryStore, Loan, Result, Transaction};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use utoipa::ToSchema;

/// Rows returned per list prop
pub const DASHBOARD_LIST_LIMIT: usize = 50;

/// A refreshable dashboard prop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DashboardProp {
    Stats,
    Loans,
    Transactions,
}

impl DashboardProp {
    pub const ALL: [DashboardProp; 3] = [
        DashboardProp::Stats,
        DashboardProp::Loans,
        DashboardProp::Transactions,
    ];

    /// Parse a comma-separated list. Empty input selects every prop.
    pub fn parse_list(raw: &str) -> Result<Vec<DashboardProp>> {
        let mut props = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let prop: DashboardProp = part.parse()?;
            if !props.contains(&prop) {
                props.push(prop);
            }
        }
        if props.is_empty() {
            props.extend(Self::ALL);
        }
        Ok(props)
    }
}

impl FromStr for DashboardProp {
    type Err = LendingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "stats" => Ok(DashboardProp::Stats),
            "loans" => Ok(DashboardProp::Loans),
            "transactions" => Ok(DashboardProp::Transactions),
            other => Err(LendingError::validation(format!(
                "unknown dashboard prop: {}",
                other
            ))),
        }
    }
}

/// Dashboard payload. Props that were not requested are omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DashboardProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<LibraryStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loans: Option<Vec<Loan>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,
}

pub struct DashboardService {
    store: Arc<dyn LibraryStore>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }

    pub async fn stats(&self) -> Result<LibraryStats> {
        self.store.stats(Utc::now()).await
    }

    pub async fn props(&self, only: &[DashboardProp]) -> Result<DashboardProps> {
        let mut props = DashboardProps::default();

        if only.contains(&DashboardProp::Stats) {
            props.stats = Some(self.stats().await?);
        }
        if only.contains(&DashboardProp::Loans) {
            let mut loans = self.store.list_loans().await?;
            loans.truncate(DASHBOARD_LIST_LIMIT);
            props.loans = Some(loans);
        }
        if only.contains(&DashboardProp::Transactions) {
            let mut transactions = self.store.list_transactions().await?;
            transactions.truncate(DASHBOARD_LIST_LIMIT);
            props.transactions = Some(transactions);
        }

        Ok(props)
    }
}

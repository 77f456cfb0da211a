// Live refresh rules
//
// Every status event is published on both the `loans` and `transactions`
// channels, so a watcher subscribed to both sees each event twice with the same
// message id. `LiveView` drops the second copy and turns the first into a
// refresh plan for the view being watched:
//
//   view          loan event                  transaction event
//   dashboard     stats                       stats
//   loans         loans, stats                loans, stats (only if it carries loans)
//   transactions  transactions, loans, stats  transactions, loans, stats

use std::collections::{HashSet, VecDeque};

use lendwise_core::{
    BroadcastPayload, LoanPayload, PersonSummary, TransactionPayload, LOAN_STATUS_CHANGED,
    NEW_STATUS, TRANSACTION_STATUS_CHANGED,
};
use tracing::{debug, warn};

use crate::client::ChannelEvent;

/// Page a watcher keeps current
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum View {
    Dashboard,
    Loans,
    Transactions,
}

impl View {
    /// Props shown by the view, fetched once on start
    pub fn props(&self) -> Vec<Prop> {
        match self {
            View::Dashboard => vec![Prop::Stats],
            View::Loans => vec![Prop::Loans, Prop::Stats],
            View::Transactions => vec![Prop::Transactions, Prop::Loans, Prop::Stats],
        }
    }
}

/// Named dashboard prop the server can return on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prop {
    Stats,
    Loans,
    Transactions,
}

impl Prop {
    pub fn as_str(&self) -> &'static str {
        match self {
            Prop::Stats => "stats",
            Prop::Loans => "loans",
            Prop::Transactions => "transactions",
        }
    }
}

/// Props to refetch after `event` while watching `view`.
///
/// `has_loans` only matters for transaction events on the loans view.
pub fn refresh_plan(view: View, event: &str, has_loans: bool) -> Vec<Prop> {
    let is_loan = event == LOAN_STATUS_CHANGED;
    if !is_loan && event != TRANSACTION_STATUS_CHANGED {
        return vec![];
    }

    match view {
        View::Dashboard => vec![Prop::Stats],
        View::Loans if is_loan || has_loans => vec![Prop::Loans, Prop::Stats],
        View::Loans => vec![],
        View::Transactions => vec![Prop::Transactions, Prop::Loans, Prop::Stats],
    }
}

/// Desktop-style notification for a status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub body: String,
}

impl Notice {
    pub fn for_payload(payload: &BroadcastPayload) -> Self {
        match payload {
            BroadcastPayload::Loan { loan, .. } => Self {
                title: "Library Update",
                body: loan_notice(loan),
            },
            BroadcastPayload::Transaction { transaction, .. } => Self {
                title: "Transaction Update",
                body: transaction_notice(transaction),
            },
        }
    }
}

fn display_name(person: Option<&PersonSummary>) -> String {
    person
        .map(|p| format!("{} {}", p.first_name, p.last_name))
        .unwrap_or_else(|| "Unknown student".to_string())
}

fn loan_notice(loan: &LoanPayload) -> String {
    let student = display_name(
        loan.transaction
            .as_ref()
            .and_then(|transaction| transaction.student.as_ref()),
    );
    let title = loan
        .book
        .as_ref()
        .map(|book| book.book_title.as_str())
        .unwrap_or("a book");

    if loan.old_status.as_deref() == Some(NEW_STATUS) && loan.new_status == "active" {
        format!("{} has borrowed \"{}\"", student, title)
    } else if loan.new_status == "returned" {
        format!("{} has returned \"{}\"", student, title)
    } else {
        format!(
            "{}'s loan for \"{}\" status changed to {}",
            student, title, loan.new_status
        )
    }
}

fn transaction_notice(transaction: &TransactionPayload) -> String {
    format!(
        "Transaction {} for {} has been {}",
        transaction.id,
        display_name(transaction.student.as_ref()),
        transaction.new_status
    )
}

/// What to do about one incoming event
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub props: Vec<Prop>,
    pub notice: Notice,
}

/// Per-watcher event state: the view plus recently seen message ids
pub struct LiveView {
    view: View,
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl LiveView {
    pub fn new(view: View) -> Self {
        Self::with_capacity(view, 256)
    }

    pub fn with_capacity(view: View, capacity: usize) -> Self {
        Self {
            view,
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Interpret one SSE frame. Returns None for handshakes, duplicates,
    /// unrelated events and payloads that do not parse.
    pub fn on_event(&mut self, event: &ChannelEvent) -> Option<Update> {
        if event.event != LOAN_STATUS_CHANGED && event.event != TRANSACTION_STATUS_CHANGED {
            debug!(channel = %event.channel, event = %event.event, "Ignoring channel event");
            return None;
        }
        if !event.id.is_empty() && !self.remember(&event.id) {
            debug!(id = %event.id, channel = %event.channel, "Duplicate event");
            return None;
        }

        let payload: BroadcastPayload = match serde_json::from_str(&event.data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(channel = %event.channel, error = %e, "Unreadable event payload");
                return None;
            }
        };

        Some(Update {
            props: refresh_plan(self.view, &event.event, payload.has_loans()),
            notice: Notice::for_payload(&payload),
        })
    }

    /// Record an id; false if it was already seen
    fn remember(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }
}

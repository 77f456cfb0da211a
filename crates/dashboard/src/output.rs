// Output formatting for the dashboard

use chrono::{DateTime, Utc};
use lendwise_core::{LibraryStats, Loan, Transaction};
use serde::Serialize;

use crate::client::DashboardData;
use crate::live::Notice;

#[derive(Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }

    /// Print a value in the structured formats. Text is handled by each command.
    pub fn print_value<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        match self {
            OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
            OutputFormat::Yaml => println!("---\n{}", serde_yaml::to_string(value)?),
            OutputFormat::Text => {}
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<16} {}", format!("{}:", label), value);
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    let header: String = columns
        .iter()
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", header);
}

/// Print a table row
pub fn print_table_row(values: &[(&str, usize)]) {
    let row: String = values
        .iter()
        .map(|(val, width)| format!("{:<width$}", truncate(val, *width), width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", row);
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let kept: String = value.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn short_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

pub fn print_stats(stats: &LibraryStats) {
    print_field("Active loans", &stats.active_loans.to_string());
    print_field("Overdue loans", &stats.overdue_loans.to_string());
    print_field("Returned today", &stats.today_returns.to_string());
    print_field("Available books", &stats.available_books.to_string());
}

pub fn print_loans(loans: &[Loan]) {
    if loans.is_empty() {
        println!("No loans");
        return;
    }
    let now = Utc::now();
    print_table_header(&[
        ("ID", 36),
        ("STATUS", 8),
        ("LOANED", 10),
        ("DUE", 10),
        ("OVERDUE", 7),
    ]);
    for loan in loans {
        let id = loan.id.to_string();
        let loaned = short_date(loan.loan_date);
        let due = short_date(loan.due_date);
        let overdue = if loan.is_overdue(now) { "yes" } else { "" };
        print_table_row(&[
            (&id, 36),
            (loan.status.as_str(), 8),
            (&loaned, 10),
            (&due, 10),
            (overdue, 7),
        ]);
    }
}

pub fn print_transactions(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No transactions");
        return;
    }
    print_table_header(&[("ID", 36), ("TYPE", 6), ("STATUS", 9), ("DATE", 10)]);
    for transaction in transactions {
        let id = transaction.id.to_string();
        let kind = transaction.transaction_type.to_string();
        let date = short_date(transaction.transaction_date);
        print_table_row(&[
            (&id, 36),
            (&kind, 6),
            (transaction.status.as_str(), 9),
            (&date, 10),
        ]);
    }
}

/// Render whichever props are present, stats first
pub fn print_dashboard(format: OutputFormat, data: &DashboardData) -> anyhow::Result<()> {
    if !format.is_text() {
        return format.print_value(data);
    }

    println!("== {} ==", Utc::now().format("%H:%M:%S"));
    if let Some(stats) = &data.stats {
        print_stats(stats);
    }
    if let Some(loans) = &data.loans {
        println!();
        println!("Loans");
        print_loans(loans);
    }
    if let Some(transactions) = &data.transactions {
        println!();
        println!("Transactions");
        print_transactions(transactions);
    }
    println!();
    Ok(())
}

pub fn print_notice(format: OutputFormat, notice: &Notice) {
    if format.is_text() {
        println!("[{}] {}", notice.title, notice.body);
    } else {
        // Keep structured stdout parseable
        eprintln!("[{}] {}", notice.title, notice.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Cien años de soledad", 10), "Cien añ...");
    }
}

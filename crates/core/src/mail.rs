// Transactional email: templates, rendering and the Mailer seam
//
// Four templates, selected by (entity kind, notification type):
//   Loan/borrowed           -> BookBorrowed          "Book Loan Confirmed"
//   Loan/returned           -> BookReturned          "Book Return Confirmed"
//   Transaction/completed   -> TransactionCompleted  "Transaction Completed"
//   Transaction/cancelled   -> TransactionCancelled  "Transaction Cancelled"
//
// Bodies are plain text rendered with minijinja from the relational snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use minijinja::{context, Environment};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::events::{EntityKind, EntitySnapshot, LoanSnapshot, TransactionSnapshot};
use crate::loan::DEFAULT_DAILY_FINE;
use crate::notifications::NotificationType;

/// Library name used in subjects and signatures when none is configured
pub const DEFAULT_LIBRARY_NAME: &str = "Book Lending System";

#[derive(Debug, Error)]
pub enum MailError {
    /// Template failed to compile or render
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Snapshot lacks data the template needs
    #[error("Missing data: {0}")]
    MissingData(String),

    /// Transport rejected or failed to deliver the message
    #[error("Transport error: {0}")]
    Transport(String),
}

// ============================================================================
// Templates
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    BookBorrowed,
    BookReturned,
    TransactionCompleted,
    TransactionCancelled,
}

impl EmailTemplate {
    /// Template for a notification, or `None` for combinations that never notify
    pub fn for_notification(kind: EntityKind, notification: NotificationType) -> Option<Self> {
        match (kind, notification) {
            (EntityKind::Loan, NotificationType::Borrowed) => Some(EmailTemplate::BookBorrowed),
            (EntityKind::Loan, NotificationType::Returned) => Some(EmailTemplate::BookReturned),
            (EntityKind::Transaction, NotificationType::Completed) => {
                Some(EmailTemplate::TransactionCompleted)
            }
            (EntityKind::Transaction, NotificationType::Cancelled) => {
                Some(EmailTemplate::TransactionCancelled)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::BookBorrowed => "book_borrowed",
            EmailTemplate::BookReturned => "book_returned",
            EmailTemplate::TransactionCompleted => "transaction_completed",
            EmailTemplate::TransactionCancelled => "transaction_cancelled",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            EmailTemplate::BookBorrowed => "Book Loan Confirmed",
            EmailTemplate::BookReturned => "Book Return Confirmed",
            EmailTemplate::TransactionCompleted => "Transaction Completed",
            EmailTemplate::TransactionCancelled => "Transaction Cancelled",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            EmailTemplate::BookBorrowed => BOOK_BORROWED_TEMPLATE,
            EmailTemplate::BookReturned => BOOK_RETURNED_TEMPLATE,
            EmailTemplate::TransactionCompleted => TRANSACTION_COMPLETED_TEMPLATE,
            EmailTemplate::TransactionCancelled => TRANSACTION_CANCELLED_TEMPLATE,
        }
    }

    const ALL: [EmailTemplate; 4] = [
        EmailTemplate::BookBorrowed,
        EmailTemplate::BookReturned,
        EmailTemplate::TransactionCompleted,
        EmailTemplate::TransactionCancelled,
    ];
}

const BOOK_BORROWED_TEMPLATE: &str = r#"{{ library_name }}

Book Loan Confirmed!
Your book has been successfully borrowed from our library.

"{{ book_title }}" by {{ author }}

Student Name:  {{ student_name }}
Loan ID:       #{{ loan_id }}
Loan Date:     {{ loan_date }}
Due Date:      {{ due_date }}
Loan Period:   {{ loan_period_days }} days
Processed by:  {{ attendant_name }}

Please return this book by {{ due_date_long }}.
Late fee: ${{ daily_fine }} per day after the due date.

Thank you for choosing {{ library_name }}!
This is an automated message. Please do not reply to this email.
"#;

const BOOK_RETURNED_TEMPLATE: &str = r#"{{ library_name }}

Book Return Confirmed!

"{{ book_title }}" by {{ author }}

Student Name:  {{ student_name }}
Loan ID:       #{{ loan_id }}
Loan Date:     {{ loan_date }}
Due Date:      {{ due_date }}
Return Date:   {{ return_date }}
Status:        Returned
{% if has_payment %}

Payment Information:
A payment of ${{ payment_amount }} was processed for this return.
{% if late %}
This may include late fees for overdue return.
{% endif %}
{% endif %}

{% if late %}
Notice: This book was returned {{ days_late }} day(s) after the due date.
Please try to return books on time to avoid any late fees.
{% else %}
Excellent! You returned this book on time. Thank you for being a responsible borrower!
{% endif %}

Thank you for using {{ library_name }}!
This is an automated message. Please do not reply to this email.
"#;

const TRANSACTION_COMPLETED_TEMPLATE: &str = r#"{{ library_name }}

Transaction Completed!
Your book lending transaction has been successfully completed.

Student Name:      {{ student_name }}
Transaction ID:    #{{ transaction_id }}
Transaction Type:  {{ transaction_type }}
Transaction Date:  {{ transaction_date }}
Status:            {{ status }}
Processed by:      {{ attendant_name }}
{% if books %}

Books in this Transaction:
{% for book in books %}
- "{{ book.title }}" by {{ book.author }}
{% endfor %}
{% endif %}

Thank you for using {{ library_name }}!
This is an automated message. Please do not reply to this email.
"#;

const TRANSACTION_CANCELLED_TEMPLATE: &str = r#"{{ library_name }}

Transaction Cancelled
Your book lending transaction has been cancelled.
If you believe this was done in error, please contact the library staff immediately.

Student Name:      {{ student_name }}
Transaction ID:    #{{ transaction_id }}
Transaction Type:  {{ transaction_type }}
Original Date:     {{ transaction_date }}
Status:            {{ status }}
Cancelled by:      {{ attendant_name }}
{% if books %}

Books that were in this Transaction:
{% for book in books %}
- "{{ book.title }}" by {{ book.author }}
{% endfor %}
{% endif %}

We apologize for any inconvenience this may have caused.
This is an automated message. Please do not reply to this email.
"#;

// ============================================================================
// Rendering
// ============================================================================

/// A rendered message ready for a transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub template: EmailTemplate,
}

#[derive(Serialize)]
struct BookLine {
    title: String,
    author: String,
}

/// Renders email bodies from entity snapshots.
pub struct MailRenderer {
    env: Environment<'static>,
    library_name: String,
}

impl MailRenderer {
    pub fn new(library_name: impl Into<String>) -> Result<Self, MailError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        for template in EmailTemplate::ALL {
            env.add_template(template.name(), template.source())?;
        }
        Ok(Self {
            env,
            library_name: library_name.into(),
        })
    }

    pub fn library_name(&self) -> &str {
        &self.library_name
    }

    /// Render `template` for `snapshot`, addressed to `to`
    pub fn render(
        &self,
        template: EmailTemplate,
        to: &str,
        snapshot: &EntitySnapshot,
    ) -> Result<OutgoingEmail, MailError> {
        let body = match (template, snapshot) {
            (EmailTemplate::BookBorrowed, EntitySnapshot::Loan(loan)) => {
                self.render_borrowed(loan)?
            }
            (EmailTemplate::BookReturned, EntitySnapshot::Loan(loan)) => {
                self.render_returned(loan)?
            }
            (
                EmailTemplate::TransactionCompleted | EmailTemplate::TransactionCancelled,
                EntitySnapshot::Transaction(transaction),
            ) => self.render_transaction(template, transaction)?,
            _ => {
                return Err(MailError::MissingData(format!(
                    "template {} does not apply to this entity",
                    template.name()
                )))
            }
        };

        Ok(OutgoingEmail {
            to: to.to_string(),
            subject: format!("{} - {}", template.subject(), self.library_name),
            body,
            template,
        })
    }

    fn render_borrowed(&self, snapshot: &LoanSnapshot) -> Result<String, MailError> {
        let loan = &snapshot.loan;
        let book = snapshot
            .book
            .as_ref()
            .ok_or_else(|| MailError::MissingData("loan has no book".to_string()))?;

        let template = self.env.get_template(EmailTemplate::BookBorrowed.name())?;
        Ok(template.render(context! {
            library_name => self.library_name,
            book_title => book.title,
            author => book.author,
            student_name => snapshot.student.as_ref().map(|s| s.full_name()).unwrap_or_default(),
            attendant_name => snapshot.attendant.as_ref().map(|a| a.full_name()).unwrap_or_else(|| "Library Staff".to_string()),
            loan_id => loan.id.to_string(),
            loan_date => format_date_time(loan.loan_date),
            due_date => format_date(loan.due_date),
            due_date_long => loan.due_date.format("%A, %B %-d, %Y").to_string(),
            loan_period_days => (loan.due_date - loan.loan_date).num_days(),
            daily_fine => DEFAULT_DAILY_FINE.round_dp(2).to_string(),
        })?)
    }

    fn render_returned(&self, snapshot: &LoanSnapshot) -> Result<String, MailError> {
        let loan = &snapshot.loan;
        let book = snapshot
            .book
            .as_ref()
            .ok_or_else(|| MailError::MissingData("loan has no book".to_string()))?;
        let return_date = loan
            .return_date
            .ok_or_else(|| MailError::MissingData("returned loan has no return date".to_string()))?;

        let late = loan.returned_late();
        let template = self.env.get_template(EmailTemplate::BookReturned.name())?;
        Ok(template.render(context! {
            library_name => self.library_name,
            book_title => book.title,
            author => book.author,
            student_name => snapshot.student.as_ref().map(|s| s.full_name()).unwrap_or_default(),
            loan_id => loan.id.to_string(),
            loan_date => format_date(loan.loan_date),
            due_date => format_date(loan.due_date),
            return_date => format_date_time(return_date),
            has_payment => loan.payment_amount > rust_decimal::Decimal::ZERO,
            payment_amount => loan.payment_amount.round_dp(2).to_string(),
            late => late,
            days_late => (return_date - loan.due_date).num_days(),
        })?)
    }

    fn render_transaction(
        &self,
        template: EmailTemplate,
        snapshot: &TransactionSnapshot,
    ) -> Result<String, MailError> {
        let transaction = &snapshot.transaction;
        let books: Vec<BookLine> = snapshot
            .loans
            .iter()
            .filter_map(|entry| entry.book.as_ref())
            .map(|book| BookLine {
                title: book.title.clone(),
                author: book.author.clone(),
            })
            .collect();

        let compiled = self.env.get_template(template.name())?;
        Ok(compiled.render(context! {
            library_name => self.library_name,
            student_name => snapshot.student.as_ref().map(|s| s.full_name()).unwrap_or_default(),
            attendant_name => snapshot.attendant.as_ref().map(|a| a.full_name()).unwrap_or_else(|| "Library Staff".to_string()),
            transaction_id => transaction.id.to_string(),
            transaction_type => capitalize(&transaction.transaction_type.to_string()),
            transaction_date => format_date(transaction.transaction_date),
            status => capitalize(transaction.status.as_str()),
            books => books,
        })?)
    }
}

fn format_date(value: DateTime<Utc>) -> String {
    value.format("%B %-d, %Y").to_string()
}

fn format_date_time(value: DateTime<Utc>) -> String {
    value.format("%B %-d, %Y %-I:%M %p").to_string()
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Mailer
// ============================================================================

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message. An error makes the calling job retry.
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;

    fn name(&self) -> &'static str {
        "Mailer"
    }
}

/// Mailer that only logs. Used when no relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            template = email.template.name(),
            "Email delivered to log"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LogMailer"
    }
}

/// Mailer that keeps sent messages in memory, for tests and local development.
///
/// `fail_next(n)` makes the next `n` sends fail with a transport error.
#[derive(Default)]
pub struct InMemoryMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    failures_remaining: Mutex<u32>,
    attempts: Mutex<u32>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: u32) {
        *self.failures_remaining.lock() = count;
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }

    /// Number of send calls, successful or not
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        *self.attempts.lock() += 1;
        {
            let mut remaining = self.failures_remaining.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MailError::Transport("simulated transport failure".to_string()));
            }
        }
        self.sent.lock().push(email.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "InMemoryMailer"
    }
}

//! These structs provide the CLI interface for the money-monitor CLI.

use crate::model::{Amount, ExpenseSource, NewExpense};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// money-monitor: track personal and business expenses.
///
/// Expenses are kept per user in a local SQLite database. The CLI can add, change and list them,
/// compute totals, category breakdowns, monthly trends and merchant spend, remember how a merchant
/// should be categorized, and serve all of this as an HTTP/JSON API.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the configuration file and the database.
    ///
    /// This is the first command you should run. By default the data directory is
    /// $HOME/money-monitor, pass --home to put it somewhere else.
    Init(InitArgs),
    /// Run the HTTP API until Ctrl-C.
    Serve(ServeArgs),
    /// Add an expense.
    Add(ExpenseArgs),
    /// Change an existing expense. The id and date are kept.
    Update(UpdateArgs),
    /// Delete an expense.
    Delete(DeleteArgs),
    /// List expenses, newest first.
    List(FilterArgs),
    /// Show total, personal and business spend.
    Totals(UserArgs),
    /// Show spend per category with percentages.
    Summary(FilterArgs),
    /// Show spend per month.
    Trend(FilterArgs),
    /// Show spend at a merchant, matched against the item and note of each expense.
    MerchantSpend(MerchantSpendArgs),
    /// Remember the category and type for a merchant.
    MerchantSave(MerchantSaveArgs),
    /// Look up the remembered category and type for a merchant.
    MerchantLookup(MerchantArgs),
    /// Run the HTTP API and log every change to one user's ledger until Ctrl-C.
    Watch(WatchArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where money-monitor data and configuration is held. Defaults to
    /// ~/money-monitor
    #[arg(long, env = "MONEY_MONITOR_HOME", default_value_t = default_home())]
    home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf) -> Self {
        Self {
            log_level,
            home: home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }
}

/// Args for the `money-monitor init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The address the HTTP API will listen on. Defaults to 127.0.0.1:8000.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

impl InitArgs {
    pub fn new(bind: Option<SocketAddr>) -> Self {
        Self { bind }
    }

    pub fn bind(&self) -> Option<SocketAddr> {
        self.bind
    }
}

/// Args for the `money-monitor serve` command.
#[derive(Debug, Parser, Clone)]
pub struct ServeArgs {
    /// Listen on this address instead of the one in config.json.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

impl ServeArgs {
    pub fn new(bind: Option<SocketAddr>) -> Self {
        Self { bind }
    }

    pub fn bind(&self) -> Option<SocketAddr> {
        self.bind
    }
}

/// Args for the `money-monitor watch` command.
#[derive(Debug, Parser, Clone)]
pub struct WatchArgs {
    #[clap(flatten)]
    user: UserArgs,

    /// Listen on this address instead of the one in config.json.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

impl WatchArgs {
    pub fn user(&self) -> &str {
        self.user.user()
    }

    pub fn bind(&self) -> Option<SocketAddr> {
        self.bind
    }
}

/// Names the user whose ledger a command acts on.
#[derive(Debug, Parser, Clone)]
pub struct UserArgs {
    /// The user id. Every expense and merchant mapping belongs to exactly one user.
    #[arg(long, short = 'u', env = "MONEY_MONITOR_USER")]
    user: String,
}

impl UserArgs {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

/// Args for the `money-monitor add` command, also used by `update`.
#[derive(Debug, Parser, Clone)]
pub struct ExpenseArgs {
    #[clap(flatten)]
    user: UserArgs,

    /// What the money was spent on, e.g. "petrol".
    #[arg(long)]
    item: String,

    /// The amount, e.g. 100 or 1,250.50. Must not be negative or above one trillion.
    #[arg(long)]
    amount: Amount,

    /// personal or business. Anything else is saved as personal.
    #[arg(long = "type")]
    expense_type: Option<String>,

    /// Free text, e.g. "consumable". Empty is shown as Uncategorized.
    #[arg(long, default_value = "")]
    category: String,

    #[arg(long, default_value = "")]
    note: String,

    /// Where the expense was captured: manual or sms.
    #[arg(long, default_value_t = ExpenseSource::Manual)]
    source: ExpenseSource,
}

impl ExpenseArgs {
    pub fn user(&self) -> &str {
        self.user.user()
    }

    /// The expense fields as they are sent to the tracker, before validation.
    pub fn new_expense(&self) -> NewExpense {
        NewExpense {
            item: self.item.clone(),
            amount: Some(self.amount),
            r#type: self.expense_type.clone(),
            category: self.category.clone(),
            note: self.note.clone(),
            source: self.source,
        }
    }
}

/// Args for the `money-monitor update` command.
#[derive(Debug, Parser, Clone)]
pub struct UpdateArgs {
    /// The id of the expense to change.
    #[arg(long)]
    id: String,

    #[clap(flatten)]
    expense: ExpenseArgs,
}

impl UpdateArgs {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn expense(&self) -> &ExpenseArgs {
        &self.expense
    }
}

/// Args for the `money-monitor delete` command.
#[derive(Debug, Parser, Clone)]
pub struct DeleteArgs {
    #[clap(flatten)]
    user: UserArgs,

    /// The id of the expense to delete.
    #[arg(long)]
    id: String,
}

impl DeleteArgs {
    pub fn user(&self) -> &str {
        self.user.user()
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Args for commands that can be narrowed to one expense type.
#[derive(Debug, Parser, Clone)]
pub struct FilterArgs {
    #[clap(flatten)]
    user: UserArgs,

    /// Only include expenses of this type: personal, business or all.
    #[arg(long = "type")]
    expense_type: Option<String>,
}

impl FilterArgs {
    pub fn user(&self) -> &str {
        self.user.user()
    }

    pub fn expense_type(&self) -> Option<&str> {
        self.expense_type.as_deref()
    }
}

/// Args for the `money-monitor merchant-spend` command.
#[derive(Debug, Parser, Clone)]
pub struct MerchantSpendArgs {
    #[clap(flatten)]
    user: UserArgs,

    /// Text to look for in the item and note of each expense, case-insensitive.
    #[arg(long)]
    merchant: String,

    /// The first day to include, YYYY-MM-DD.
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// The last day to include, YYYY-MM-DD.
    #[arg(long)]
    end_date: Option<NaiveDate>,
}

impl MerchantSpendArgs {
    pub fn user(&self) -> &str {
        self.user.user()
    }

    pub fn merchant(&self) -> &str {
        &self.merchant
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }
}

/// Args for the `money-monitor merchant-save` command.
#[derive(Debug, Parser, Clone)]
pub struct MerchantSaveArgs {
    #[clap(flatten)]
    target: MerchantArgs,

    #[arg(long)]
    category: String,

    /// personal or business. Anything else is saved as personal.
    #[arg(long = "type")]
    expense_type: Option<String>,
}

impl MerchantSaveArgs {
    pub fn user(&self) -> &str {
        self.target.user()
    }

    pub fn merchant(&self) -> &str {
        self.target.merchant()
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn expense_type(&self) -> Option<&str> {
        self.expense_type.as_deref()
    }
}

/// Args for the `money-monitor merchant-lookup` command.
#[derive(Debug, Parser, Clone)]
pub struct MerchantArgs {
    #[clap(flatten)]
    user: UserArgs,

    /// The merchant name. Matching ignores case and surrounding whitespace.
    #[arg(long)]
    merchant: String,
}

impl MerchantArgs {
    pub fn user(&self) -> &str {
        self.user.user()
    }

    pub fn merchant(&self) -> &str {
        &self.merchant
    }
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("money-monitor"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or MONEY_MONITOR_HOME instead of relying on the default \
                data directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("money-monitor")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}

// Domain models shared by the repositories and services

pub mod account;
pub mod counterparty;
pub mod order;

pub use account::{Asset, BotSettings, BotStrategy, LedgerEntry, LedgerKind, UserAccount};
pub use counterparty::{BulkUpdateReport, Counterparty, CounterpartySide, CounterpartyStatus};
pub use order::{Order, OrderSide, OrderSource, OrderStatus};

pub mod ledger;
mod locks;

pub use ledger::{Allowance, ChargeSource, QuotaLedger, Reservation};

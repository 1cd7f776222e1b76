//! Booking core: registrations, the credit ledger and slot capacity.
//!
//! - [`lifecycle`]: [`RegistrationManager`] creates, cancels, reactivates and deletes bookings
//! - [`ledger`]: [`CreditLedger`] moves and reports subscription credits
//! - [`availability`]: remaining capacity of one occurrence or a whole day
//! - [`validation`]: which credit types a class accepts
//! - [`slot`]: parsing of the time strings bookings carry

pub mod availability;
pub mod ledger;
pub mod lifecycle;
pub mod slot;
pub mod validation;

pub use availability::{AvailabilityView, SlotAvailability};
pub use ledger::CreditLedger;
pub use lifecycle::{RegistrationManager, RegistrationRequest, StatusUpdateOptions};
pub use validation::{CreditTypeInfo, CreditValidation};

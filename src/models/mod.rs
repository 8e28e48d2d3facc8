mod audit_event;
mod checkout_session;
mod entitlement;
mod invoice;
mod notification;
mod payment;
mod price;
mod profile;
mod subscription;

pub use audit_event::*;
pub use checkout_session::*;
pub use entitlement::*;
pub use invoice::*;
pub use notification::*;
pub use payment::*;
pub use price::*;
pub use profile::*;
pub use subscription::*;

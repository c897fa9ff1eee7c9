pub mod email;

pub use email::{EmailError, EmailSender, EmailService, OutboundEmail};

#[cfg(test)]
pub use email::MockEmailSender;

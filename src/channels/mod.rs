//! Channel abstraction for message I/O.

pub mod channel;
pub mod telegram;
pub mod whatsapp;

pub use channel::*;
pub use telegram::TelegramChannel;
pub use whatsapp::WhatsAppChannel;

//! Session-independent building blocks: events, the event sink, research
//! context, chat history and interrupt handling.

pub mod context;
pub mod conversation;
pub mod events;
pub mod interrupt;
pub mod sink;

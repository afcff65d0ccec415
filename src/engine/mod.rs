// Gateway Engine — session core and HTTP surface
//
//   whatsapp — session state, facade, auto-reply, Evolution API transport
//   server   — axum router and handlers

pub mod whatsapp;
pub mod server;

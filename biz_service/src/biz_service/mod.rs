pub mod chat_service;
pub mod message_router;
pub mod recommend_service;
pub mod session_sink;
#[cfg(test)]
pub(crate) mod test_support;

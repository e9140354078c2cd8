use crate::core::{errors::ExchangeError, types::WsEvent};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Receiver for the data frames of one subscription.
///
/// Any `Fn(&WsEvent)` closure is a handler. Implement the trait directly to
/// also observe errors that belong to the subscription (for example a
/// rejected subscribe request).
pub trait MessageHandler: Send + Sync {
    fn handle(&self, event: &WsEvent);

    fn on_error(&self, _error: &ExchangeError) {}
}

impl<F> MessageHandler for F
where
    F: Fn(&WsEvent) + Send + Sync,
{
    fn handle(&self, event: &WsEvent) {
        self(event);
    }
}

/// Session-level error sink.
pub type ErrorCallback = Arc<dyn Fn(&ExchangeError) + Send + Sync>;

/// Adapter that deserializes each payload into `T` before calling `f`.
///
/// Payloads that do not match `T` are logged and skipped.
pub struct TypedHandler<T, F> {
    f: F,
    _payload: PhantomData<fn() -> T>,
}

pub fn typed_handler<T, F>(f: F) -> TypedHandler<T, F>
where
    T: DeserializeOwned,
    F: Fn(&str, T) + Send + Sync,
{
    TypedHandler {
        f,
        _payload: PhantomData,
    }
}

impl<T, F> MessageHandler for TypedHandler<T, F>
where
    T: DeserializeOwned,
    F: Fn(&str, T) + Send + Sync,
{
    fn handle(&self, event: &WsEvent) {
        match event.parse::<T>() {
            Ok(payload) => (self.f)(&event.topic, payload),
            Err(e) => warn!(topic = %event.topic, error = %e, "Dropping payload of unexpected shape"),
        }
    }
}

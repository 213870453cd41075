use std::collections::BTreeMap;

use crate::error::CResult;
use crate::types::context::Context;
use crate::types::tx::{Msg, MsgResult};

/// Handles one message inside a transaction, with the per-tx context.
pub type Handler = Box<dyn Fn(&Context, &dyn Msg) -> CResult<MsgResult> + Send>;

/// Maps message route names to handlers.
///
/// Registration is append-only and happens while the application is being
/// configured; an invalid or duplicate name is a fatal misconfiguration.
#[derive(Default)]
pub struct Router {
    routes: BTreeMap<String, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: BTreeMap::new() }
    }

    pub fn add_route(&mut self, name: impl Into<String>, handler: Handler) {
        let name = name.into();
        if !is_valid_route_name(&name) {
            panic!("route name {:?} must be non-empty lowercase alphanumeric", name);
        }
        if self.routes.contains_key(&name) {
            panic!("route {:?} is already registered", name);
        }
        self.routes.insert(name, handler);
    }

    pub fn route(&self, name: &str) -> Option<&Handler> {
        self.routes.get(name)
    }

    pub fn has_route(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }
}

fn is_valid_route_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> Handler {
        Box::new(|_ctx, _msg| Ok(MsgResult::default()))
    }

    #[test]
    fn routes_resolve_by_name() {
        let mut router = Router::new();
        router.add_route("bank", noop_handler());
        router.add_route("gov2", noop_handler());

        assert!(router.route("bank").is_some());
        assert!(router.has_route("gov2"));
        assert!(router.route("staking").is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_route_is_fatal() {
        let mut router = Router::new();
        router.add_route("bank", noop_handler());
        router.add_route("bank", noop_handler());
    }

    #[test]
    #[should_panic(expected = "lowercase alphanumeric")]
    fn uppercase_route_name_is_fatal() {
        let mut router = Router::new();
        router.add_route("Bank", noop_handler());
    }

    #[test]
    #[should_panic(expected = "lowercase alphanumeric")]
    fn empty_route_name_is_fatal() {
        let mut router = Router::new();
        router.add_route("", noop_handler());
    }
}

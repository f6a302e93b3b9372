use crate::error::Result;
use crate::handler::Callback;
use crate::params::ParamKey;
use crate::pattern::{PathMatch, Pattern, PatternOptions};
use crate::route::Route;

/// An entry of a router's stack: a compiled pattern bound to either a
/// middleware callback or a route.
#[derive(Debug)]
pub(crate) struct Layer {
    pattern: Pattern,
    kind: LayerKind,
}

#[derive(Debug)]
pub(crate) enum LayerKind {
    Middleware(Callback),
    Route(Route),
}

impl Layer {
    /// Creates a prefix-matching middleware layer.
    pub(crate) fn middleware(path: &str, sensitive: bool, callback: Callback) -> Self {
        let options = PatternOptions {
            sensitive,
            strict: false,
            end: false,
        };
        Self::new(path, options, LayerKind::Middleware(callback))
    }

    /// Creates an exact-matching layer owning a new route.
    pub(crate) fn exact(path: &str, sensitive: bool, strict: bool) -> Self {
        let options = PatternOptions {
            sensitive,
            strict,
            end: true,
        };
        Self::new(path, options, LayerKind::Route(Route::new(path)))
    }

    fn new(path: &str, options: PatternOptions, kind: LayerKind) -> Self {
        let pattern = match Pattern::compile(path, options) {
            Ok(pattern) => pattern,
            Err(err) => panic!("invalid path pattern '{}': {}", path, err),
        };

        tracing::debug!(path, ?options, "new layer");
        Self { pattern, kind }
    }

    pub(crate) fn path(&self) -> &str {
        self.pattern.as_str()
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &ParamKey> {
        self.pattern.keys()
    }

    pub(crate) fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub(crate) fn route(&self) -> Option<&Route> {
        match &self.kind {
            LayerKind::Route(route) => Some(route),
            LayerKind::Middleware(_) => None,
        }
    }

    pub(crate) fn route_mut(&mut self) -> Option<&mut Route> {
        match &mut self.kind {
            LayerKind::Route(route) => Some(route),
            LayerKind::Middleware(_) => None,
        }
    }

    /// Matches the layer against a request path.
    pub(crate) fn matches(&self, path: &str) -> Result<Option<PathMatch>> {
        self.pattern.matches(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{sync_fn, Next};

    #[test]
    fn middleware_layers_match_prefixes() {
        let layer = Layer::middleware("/admin", false, Callback::handler(sync_fn(|_| Ok(Next::Continue))));
        assert_eq!(layer.matches("/admin/users").unwrap().unwrap().path, "/admin");
        assert_eq!(layer.matches("/ADMIN").unwrap().unwrap().path, "/ADMIN");
        assert!(layer.matches("/administrator").unwrap().is_none());
        assert!(layer.route().is_none());
    }

    #[test]
    fn route_layers_match_exactly() {
        let layer = Layer::exact("/user/:id", false, true);
        assert!(layer.matches("/user/1").unwrap().is_some());
        assert!(layer.matches("/user/1/").unwrap().is_none());
        assert!(layer.matches("/user/1/posts").unwrap().is_none());
        assert_eq!(layer.route().map(Route::path), Some("/user/:id"));
        assert_eq!(layer.keys().count(), 1);
    }

    #[test]
    #[should_panic(expected = "invalid path pattern")]
    fn invalid_patterns_panic() {
        Layer::exact("/broken/:id([)", false, false);
    }
}

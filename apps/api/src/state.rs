use store::Store;

/// Handlers are thin translation layers over `crates/store`/`crates/domain`;
/// the only shared handle they need is the store itself.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
}

/// Backend-opaque handle to one renderable imagery layer.
///
/// Handles are issued by a backend and never reused by it, so a stale
/// handle simply stops matching anything.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerHandle(u64);

impl LayerHandle {
    pub fn new(raw: u64) -> Self {
        LayerHandle(raw)
    }
}

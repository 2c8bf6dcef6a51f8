use std::collections::BTreeMap;

use foundation::handles::LayerHandle;
use foundation::time::TimeTag;
use serde::{Deserialize, Serialize};

use crate::imagery::ImagerySource;

/// State of one resident layer as a backend reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSnapshot {
    pub handle: LayerHandle,
    pub provider_id: u64,
    pub tag: Option<TimeTag>,
    pub opacity: f64,
    pub visible: bool,
    pub pick_enabled: bool,
}

/// Rendering target for imagery layers.
///
/// Contract:
/// - new layers are added on top of the stack, hidden.
/// - `raise`/`lower` move a layer exactly one position.
/// - every call taking a handle is a no-op for handles the backend does not
///   know, so releasing twice is harmless.
pub trait ImageryBackend {
    fn name(&self) -> &'static str;
    fn create_layer(&mut self, source: ImagerySource, opacity: f64) -> LayerHandle;
    fn destroy_layer(&mut self, handle: LayerHandle);
    fn set_visible(&mut self, handle: LayerHandle, visible: bool);
    fn set_opacity(&mut self, handle: LayerHandle, opacity: f64);
    fn set_pick_enabled(&mut self, handle: LayerHandle, enabled: bool);
    fn raise(&mut self, handle: LayerHandle);
    fn lower(&mut self, handle: LayerHandle);
    /// Position from the bottom of the stack.
    fn index_of(&self, handle: LayerHandle) -> Option<usize>;
    fn layer_count(&self) -> usize;
    /// Resident layers, bottom to top.
    fn layers(&self) -> Vec<LayerSnapshot>;
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Globe,
    FlatMap,
}

impl BackendKind {
    pub fn build(self) -> Box<dyn ImageryBackend> {
        match self {
            BackendKind::Globe => Box::new(GlobeBackend::new()),
            BackendKind::FlatMap => Box::new(FlatMapBackend::new()),
        }
    }
}

#[derive(Debug, Clone)]
struct ResidentLayer {
    handle: LayerHandle,
    source: ImagerySource,
    opacity: f64,
    visible: bool,
    pick_enabled: bool,
}

impl ResidentLayer {
    fn new(handle: LayerHandle, source: ImagerySource, opacity: f64) -> Self {
        let pick_enabled = source.pick_features;
        Self {
            handle,
            source,
            opacity,
            visible: false,
            pick_enabled,
        }
    }

    fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            handle: self.handle,
            provider_id: self.source.provider_id,
            tag: self.source.tag.clone(),
            opacity: self.opacity,
            visible: self.visible,
            pick_enabled: self.pick_enabled,
        }
    }
}

/// Globe-style layer collection: an ordered stack where position is the
/// draw order.
#[derive(Debug, Default)]
pub struct GlobeBackend {
    next_handle: u64,
    stack: Vec<ResidentLayer>,
}

impl GlobeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, handle: LayerHandle) -> Option<usize> {
        self.stack.iter().position(|l| l.handle == handle)
    }

    fn layer_mut(&mut self, handle: LayerHandle) -> Option<&mut ResidentLayer> {
        self.stack.iter_mut().find(|l| l.handle == handle)
    }
}

impl ImageryBackend for GlobeBackend {
    fn name(&self) -> &'static str {
        "globe"
    }

    fn create_layer(&mut self, source: ImagerySource, opacity: f64) -> LayerHandle {
        self.next_handle += 1;
        let handle = LayerHandle::new(self.next_handle);
        self.stack.push(ResidentLayer::new(handle, source, opacity));
        handle
    }

    fn destroy_layer(&mut self, handle: LayerHandle) {
        self.stack.retain(|l| l.handle != handle);
    }

    fn set_visible(&mut self, handle: LayerHandle, visible: bool) {
        if let Some(layer) = self.layer_mut(handle) {
            layer.visible = visible;
        }
    }

    fn set_opacity(&mut self, handle: LayerHandle, opacity: f64) {
        if let Some(layer) = self.layer_mut(handle) {
            layer.opacity = opacity;
        }
    }

    fn set_pick_enabled(&mut self, handle: LayerHandle, enabled: bool) {
        if let Some(layer) = self.layer_mut(handle) {
            layer.pick_enabled = enabled;
        }
    }

    fn raise(&mut self, handle: LayerHandle) {
        if let Some(i) = self.position(handle)
            && i + 1 < self.stack.len()
        {
            self.stack.swap(i, i + 1);
        }
    }

    fn lower(&mut self, handle: LayerHandle) {
        if let Some(i) = self.position(handle)
            && i > 0
        {
            self.stack.swap(i, i - 1);
        }
    }

    fn index_of(&self, handle: LayerHandle) -> Option<usize> {
        self.position(handle)
    }

    fn layer_count(&self) -> usize {
        self.stack.len()
    }

    fn layers(&self) -> Vec<LayerSnapshot> {
        self.stack.iter().map(ResidentLayer::snapshot).collect()
    }
}

/// Flat-map style pane: layers carry a z-index and draw order is the z-index
/// order. Reordering swaps z-indices with the nearest neighbour.
#[derive(Debug, Default)]
pub struct FlatMapBackend {
    next_handle: u64,
    next_z: i64,
    layers: BTreeMap<LayerHandle, (i64, ResidentLayer)>,
}

impl FlatMapBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn z_of(&self, handle: LayerHandle) -> Option<i64> {
        self.layers.get(&handle).map(|(z, _)| *z)
    }

    fn swap_z(&mut self, a: LayerHandle, b: LayerHandle) {
        let (Some(za), Some(zb)) = (self.z_of(a), self.z_of(b)) else {
            return;
        };
        if let Some(entry) = self.layers.get_mut(&a) {
            entry.0 = zb;
        }
        if let Some(entry) = self.layers.get_mut(&b) {
            entry.0 = za;
        }
    }

    fn neighbour(&self, handle: LayerHandle, above: bool) -> Option<LayerHandle> {
        let z = self.z_of(handle)?;
        let candidates = self.layers.iter().filter(|(_, (other, _))| {
            if above { *other > z } else { *other < z }
        });
        if above {
            candidates.min_by_key(|(_, (other, _))| *other).map(|(h, _)| *h)
        } else {
            candidates.max_by_key(|(_, (other, _))| *other).map(|(h, _)| *h)
        }
    }

    fn layer_mut(&mut self, handle: LayerHandle) -> Option<&mut ResidentLayer> {
        self.layers.get_mut(&handle).map(|(_, layer)| layer)
    }

    fn ordered(&self) -> Vec<(i64, &ResidentLayer)> {
        let mut ordered: Vec<_> = self.layers.values().map(|(z, l)| (*z, l)).collect();
        ordered.sort_by_key(|(z, _)| *z);
        ordered
    }
}

impl ImageryBackend for FlatMapBackend {
    fn name(&self) -> &'static str {
        "flat_map"
    }

    fn create_layer(&mut self, source: ImagerySource, opacity: f64) -> LayerHandle {
        self.next_handle += 1;
        self.next_z += 1;
        let handle = LayerHandle::new(self.next_handle);
        self.layers
            .insert(handle, (self.next_z, ResidentLayer::new(handle, source, opacity)));
        handle
    }

    fn destroy_layer(&mut self, handle: LayerHandle) {
        self.layers.remove(&handle);
    }

    fn set_visible(&mut self, handle: LayerHandle, visible: bool) {
        if let Some(layer) = self.layer_mut(handle) {
            layer.visible = visible;
        }
    }

    fn set_opacity(&mut self, handle: LayerHandle, opacity: f64) {
        if let Some(layer) = self.layer_mut(handle) {
            layer.opacity = opacity;
        }
    }

    fn set_pick_enabled(&mut self, handle: LayerHandle, enabled: bool) {
        if let Some(layer) = self.layer_mut(handle) {
            layer.pick_enabled = enabled;
        }
    }

    fn raise(&mut self, handle: LayerHandle) {
        if let Some(other) = self.neighbour(handle, true) {
            self.swap_z(handle, other);
        }
    }

    fn lower(&mut self, handle: LayerHandle) {
        if let Some(other) = self.neighbour(handle, false) {
            self.swap_z(handle, other);
        }
    }

    fn index_of(&self, handle: LayerHandle) -> Option<usize> {
        let z = self.z_of(handle)?;
        Some(self.layers.values().filter(|(other, _)| *other < z).count())
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layers(&self) -> Vec<LayerSnapshot> {
        self.ordered().into_iter().map(|(_, l)| l.snapshot()).collect()
    }
}

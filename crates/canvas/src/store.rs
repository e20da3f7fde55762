use region::geometry::overlaps;
use region::{CanvasPoint, CanvasRect, Region, RegionId, RegionPatch};

/// Events emitted by the region store, synchronously, after each mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    RegionAdded(RegionId),
    RegionUpdated(RegionId),
    RegionRemoved(RegionId),
}

/// A candidate rectangle intersects an existing region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("region would overlap existing region {conflicting}")]
pub struct OverlapRejected {
    pub conflicting: RegionId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&StoreEvent)>;

/// The authoritative collection of regions.
///
/// Regions are kept in insertion order, which is also paint order: the last
/// region is drawn on top and wins hit-tests.
#[derive(Default)]
pub struct RegionStore {
    regions: Vec<Region>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl RegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region covering `rect`, unless it overlaps an existing one.
    ///
    /// Shared edges and corners are allowed.
    pub fn create(&mut self, rect: CanvasRect) -> Result<RegionId, OverlapRejected> {
        if let Some(existing) = self.regions.iter().find(|r| overlaps(&r.rect(), &rect)) {
            log::debug!("rejected region at {:?}: overlaps {}", rect, existing.id);
            return Err(OverlapRejected {
                conflicting: existing.id,
            });
        }

        let region = Region::new(rect);
        let id = region.id;
        self.regions.push(region);
        log::debug!("created region {}", id);
        self.emit(StoreEvent::RegionAdded(id));
        Ok(id)
    }

    /// Apply a patch to a region. Geometry patches are not checked for
    /// overlap. Returns false when the region does not exist.
    pub fn update(&mut self, id: RegionId, patch: RegionPatch) -> bool {
        let Some(region) = self.regions.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        if region.apply(patch) {
            self.emit(StoreEvent::RegionUpdated(id));
        }
        true
    }

    /// Remove a region, returning it.
    pub fn remove(&mut self, id: RegionId) -> Option<Region> {
        let index = self.regions.iter().position(|r| r.id == id)?;
        let region = self.regions.remove(index);
        log::debug!("removed region {}", id);
        self.emit(StoreEvent::RegionRemoved(id));
        Some(region)
    }

    /// All regions in paint order (back to front).
    pub fn list(&self) -> &[Region] {
        &self.regions
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: RegionId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Find the topmost region at a canvas point.
    pub fn region_at(&self, point: CanvasPoint) -> Option<RegionId> {
        self.regions
            .iter()
            .rev()
            .find(|r| r.contains_point(point))
            .map(|r| r.id)
    }

    /// Resolve a full or short (8 character) id.
    pub fn find_by_str(&self, id: &str) -> Option<RegionId> {
        self.regions.iter().find(|r| r.id.matches(id)).map(|r| r.id)
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&StoreEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    fn emit(&mut self, event: StoreEvent) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use region::{CanvasSize, Phase};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> CanvasRect {
        CanvasRect::from_xywh(x, y, w, h)
    }

    #[test]
    fn test_create_rejects_overlap() {
        let mut store = RegionStore::new();
        let first = store.create(rect(100.0, 100.0, 200.0, 200.0)).unwrap();

        let err = store.create(rect(250.0, 250.0, 150.0, 150.0)).unwrap_err();
        assert_eq!(err.conflicting, first);
        assert_eq!(store.len(), 1);

        // Touching edges are fine.
        assert!(store.create(rect(300.0, 100.0, 100.0, 100.0)).is_ok());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_overlapping_second_region() {
        let mut store = RegionStore::new();
        store.create(rect(10.0, 10.0, 100.0, 100.0)).unwrap();
        assert!(store.create(rect(50.0, 50.0, 100.0, 100.0)).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_list_keeps_creation_order() {
        let mut store = RegionStore::new();
        let a = store.create(rect(10.0, 10.0, 100.0, 100.0)).unwrap();
        let b = store.create(rect(200.0, 10.0, 100.0, 100.0)).unwrap();
        let ids: Vec<_> = store.list().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_new_region_defaults() {
        let mut store = RegionStore::new();
        let id = store.create(rect(0.0, 0.0, 120.0, 100.0)).unwrap();
        let region = store.get(id).unwrap();
        assert_eq!(region.phase, Phase::Editing);
        assert!(region.prompt.is_empty());
        assert!(region.program.is_none());
    }

    #[test]
    fn test_update_skips_overlap_check() {
        let mut store = RegionStore::new();
        let a = store.create(rect(0.0, 0.0, 100.0, 100.0)).unwrap();
        store.create(rect(200.0, 0.0, 100.0, 100.0)).unwrap();
        assert!(store.update(a, RegionPatch::Size(CanvasSize::new(250.0, 100.0))));
        assert_eq!(store.get(a).unwrap().size, CanvasSize::new(250.0, 100.0));
        assert!(!store.update(RegionId::new(), RegionPatch::Prompt("x".into())));
    }

    #[test]
    fn test_region_at_prefers_topmost() {
        let mut store = RegionStore::new();
        let a = store.create(rect(0.0, 0.0, 100.0, 100.0)).unwrap();
        let b = store.create(rect(100.0, 0.0, 100.0, 100.0)).unwrap();
        // The shared edge belongs to both; the later region is on top.
        assert_eq!(store.region_at(CanvasPoint::new(100.0, 50.0)), Some(b));
        assert_eq!(store.region_at(CanvasPoint::new(50.0, 50.0)), Some(a));
        assert_eq!(store.region_at(CanvasPoint::new(500.0, 50.0)), None);
    }

    #[test]
    fn test_subscribers_see_every_mutation() {
        let mut store = RegionStore::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = store.subscribe(move |event| sink.borrow_mut().push(*event));

        let id = store.create(rect(0.0, 0.0, 100.0, 100.0)).unwrap();
        store.update(id, RegionPatch::Prompt("pie chart".into()));
        store.remove(id);
        assert_eq!(
            *seen.borrow(),
            vec![
                StoreEvent::RegionAdded(id),
                StoreEvent::RegionUpdated(id),
                StoreEvent::RegionRemoved(id)
            ]
        );

        assert!(store.unsubscribe(sub));
        store.create(rect(0.0, 0.0, 100.0, 100.0)).unwrap();
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn test_remove_unknown_is_none() {
        let mut store = RegionStore::new();
        assert!(store.remove(RegionId::new()).is_none());
    }

    proptest! {
        #[test]
        fn created_regions_never_overlap(
            rects in prop::collection::vec((0.0f32..800.0, 0.0f32..800.0, 1.0f32..300.0, 1.0f32..300.0), 1..40)
        ) {
            let mut store = RegionStore::new();
            for (x, y, w, h) in rects {
                let _ = store.create(rect(x, y, w, h));
            }
            let regions = store.list();
            for (i, a) in regions.iter().enumerate() {
                for b in &regions[i + 1..] {
                    prop_assert!(!overlaps(&a.rect(), &b.rect()));
                }
            }
        }
    }
}

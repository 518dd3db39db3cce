//! Named indicator registries.
//!
//! A `Registry<I>` maps names (station names, client type names, resource
//! names) to indicators of one kind.  Lookups by name hash a string, so the
//! runtime resolves a name once and keeps the returned [`IndicatorHandle`]
//! in its per-station / per-type caches.

use rustc_hash::FxHashMap;

use crate::indicator::Indicator;

/// Stable index of an indicator inside one registry.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndicatorHandle(pub u32);

impl IndicatorHandle {
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Insertion-ordered map from name to indicator.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Registry<I> {
    names:    Vec<String>,
    items:    Vec<I>,
    index:    FxHashMap<String, u32>,
    template: I,
}

impl<I: Indicator + Default> Default for Registry<I> {
    fn default() -> Self {
        Self::with_template(I::default())
    }
}

impl<I: Indicator> Registry<I> {
    /// New entries start as clones of `template`.
    pub fn with_template(template: I) -> Self {
        Self { names: Vec::new(), items: Vec::new(), index: FxHashMap::default(), template }
    }

    /// Handle for `name`, creating the indicator on first use.
    pub fn register(&mut self, name: &str) -> IndicatorHandle {
        if let Some(&i) = self.index.get(name) {
            return IndicatorHandle(i);
        }
        let i = self.items.len() as u32;
        self.names.push(name.to_owned());
        self.items.push(self.template.clone());
        self.index.insert(name.to_owned(), i);
        IndicatorHandle(i)
    }

    pub fn handle(&self, name: &str) -> Option<IndicatorHandle> {
        self.index.get(name).map(|&i| IndicatorHandle(i))
    }

    #[inline]
    pub fn get(&self, handle: IndicatorHandle) -> &I {
        &self.items[handle.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, handle: IndicatorHandle) -> &mut I {
        &mut self.items[handle.index()]
    }

    pub fn by_name(&self, name: &str) -> Option<&I> {
        self.handle(name).map(|h| self.get(h))
    }

    /// Mutable indicator for `name`, created on first use.
    pub fn entry(&mut self, name: &str) -> &mut I {
        let h = self.register(name);
        self.get_mut(h)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// `(name, indicator)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &I)> {
        self.names.iter().map(String::as_str).zip(self.items.iter())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut I> {
        self.items.iter_mut()
    }

    pub fn reset_all(&mut self) {
        self.items.iter_mut().for_each(Indicator::reset);
    }

    pub fn finish_run_all(&mut self) {
        self.items.iter_mut().for_each(Indicator::finish_run);
    }

    /// Merge every indicator of `other` into the one with the same name.
    pub fn merge(&mut self, other: &Registry<I>) {
        for (name, item) in other.iter() {
            self.entry(name).merge(item);
        }
    }
}

// ── IndicatorCache ────────────────────────────────────────────────────────────

/// Handles of one registry indexed by a dense id (station or client type).
///
/// Resolving a name costs one hash lookup; afterwards the cache hands out
/// the indicator by index.  Handles stay valid because registries never
/// remove entries.
#[derive(Clone, Debug, Default)]
pub struct IndicatorCache {
    handles: Vec<Option<IndicatorHandle>>,
}

impl IndicatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for slot `index`, registering `name` on first use.
    pub fn resolve<I: Indicator>(
        &mut self,
        registry: &mut Registry<I>,
        index:    usize,
        name:     &str,
    ) -> IndicatorHandle {
        if self.handles.len() <= index {
            self.handles.resize(index + 1, None);
        }
        match self.handles[index] {
            Some(h) => h,
            None => {
                let h = registry.register(name);
                self.handles[index] = Some(h);
                h
            }
        }
    }

    /// The indicator for slot `index`, registering `name` on first use.
    pub fn get_mut<'r, I: Indicator>(
        &mut self,
        registry: &'r mut Registry<I>,
        index:    usize,
        name:     &str,
    ) -> &'r mut I {
        let h = self.resolve(registry, index, name);
        registry.get_mut(h)
    }

    /// Forget all handles (the registry was replaced).
    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Frame-delayed residency caches for texture handles, samplers and VAOs.
//!
//! Entries record the last frame they were used in. At frame end, entries
//! unused for `reclaim_delay` frames are destroyed: by then no in-flight
//! frame can still reference them.

use super::api::GlApi;
use ahash::AHashMap;
use kiln_core::renderer::resources::{SamplerDescriptor, VertexLayout};
use kiln_core::renderer::{SamplerHash, SamplerObject, TextureId, VaoId};
use std::fmt::Debug;
use std::hash::Hash;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    last_used: u64,
}

/// A map whose entries expire a fixed number of frames after their last use.
#[derive(Debug)]
pub struct ResidencyCache<K, V> {
    label: &'static str,
    reclaim_delay: u64,
    entries: AHashMap<K, CacheEntry<V>>,
}

impl<K, V> ResidencyCache<K, V>
where
    K: Copy + Eq + Hash + Debug,
    V: Copy,
{
    /// Creates an empty cache.
    pub fn new(label: &'static str, reclaim_delay: u64) -> Self {
        Self {
            label,
            reclaim_delay,
            entries: AHashMap::new(),
        }
    }

    /// Returns the cached value without touching it.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value)
    }

    /// Returns the value for `key`, creating it if missing, and marks it used in `frame`.
    pub fn get_or_insert_with(&mut self, key: K, frame: u64, create: impl FnOnce() -> V) -> V {
        let entry = self.entries.entry(key).or_insert_with(|| CacheEntry {
            value: create(),
            last_used: frame,
        });
        entry.last_used = entry.last_used.max(frame);
        entry.value
    }

    /// Marks `key` used in `frame`. Returns `false` if it is not cached.
    pub fn touch(&mut self, key: &K, frame: u64) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = entry.last_used.max(frame);
                true
            }
            None => false,
        }
    }

    /// Destroys every entry not used in the last `reclaim_delay` frames.
    pub fn evict_unused(&mut self, frame: u64, mut destroy: impl FnMut(K, V)) -> usize {
        let delay = self.reclaim_delay;
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| frame >= entry.last_used + delay)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            if let Some(entry) = self.entries.remove(key) {
                destroy(*key, entry.value);
            }
        }
        if !expired.is_empty() {
            log::debug!("{}: evicted {} entries at frame {frame}", self.label, expired.len());
        }
        expired.len()
    }

    /// Removes one entry immediately.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Destroys every entry.
    pub fn drain(&mut self, mut destroy: impl FnMut(K, V)) {
        for (key, entry) in self.entries.drain() {
            destroy(key, entry.value);
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Texture handles, sampler objects and vertex arrays owned by one context.
#[derive(Debug)]
pub struct ResidencyCaches {
    /// Resident bindless handles keyed by texture and sampler.
    pub texture_handles: ResidencyCache<(TextureId, SamplerObject), u64>,
    /// Sampler objects keyed by descriptor hash.
    pub samplers: ResidencyCache<SamplerHash, SamplerObject>,
    /// Vertex arrays keyed by vertex-layout hash.
    pub vaos: ResidencyCache<u64, VaoId>,
}

impl ResidencyCaches {
    /// Creates empty caches sharing one reclaim delay.
    pub fn new(reclaim_delay: u64) -> Self {
        Self {
            texture_handles: ResidencyCache::new("texture residency", reclaim_delay),
            samplers: ResidencyCache::new("sampler cache", reclaim_delay),
            vaos: ResidencyCache::new("vao cache", reclaim_delay),
        }
    }

    /// Returns a resident handle for `texture` sampled with `sampler`.
    pub fn make_resident<A: GlApi>(
        &mut self,
        api: &mut A,
        texture: TextureId,
        sampler: SamplerObject,
        frame: u64,
    ) -> u64 {
        self.texture_handles
            .get_or_insert_with((texture, sampler), frame, || {
                let handle = api.texture_handle(texture, sampler);
                api.make_handle_resident(handle, true);
                handle
            })
    }

    /// Returns the sampler object for `descriptor`, creating it on first use.
    pub fn sampler<A: GlApi>(
        &mut self,
        api: &mut A,
        descriptor: &SamplerDescriptor,
        frame: u64,
    ) -> SamplerObject {
        self.samplers
            .get_or_insert_with(descriptor.hash_value(), frame, || api.create_sampler(descriptor))
    }

    /// Returns the vertex array for `layout`, creating it on first use.
    pub fn vao<A: GlApi>(&mut self, api: &mut A, layout: &VertexLayout, frame: u64) -> VaoId {
        self.vaos
            .get_or_insert_with(layout.hash_value(), frame, || api.create_vertex_array(layout))
    }

    /// Evicts everything unused for the reclaim delay. Returns the number of evictions.
    pub fn evict_unused<A: GlApi>(&mut self, api: &mut A, frame: u64) -> usize {
        self.texture_handles
            .evict_unused(frame, |_, handle| api.make_handle_resident(handle, false))
            + self
                .samplers
                .evict_unused(frame, |_, sampler| api.delete_sampler(sampler))
            + self.vaos.evict_unused(frame, |_, vao| api.delete_vertex_array(vao))
    }

    /// Drops every texture handle referring to `texture`, e.g. before it is deleted.
    pub fn forget_texture<A: GlApi>(&mut self, api: &mut A, texture: TextureId) {
        let keys: Vec<_> = self
            .texture_handles
            .entries
            .keys()
            .filter(|(t, _)| *t == texture)
            .copied()
            .collect();
        for key in keys {
            if let Some(handle) = self.texture_handles.remove(&key) {
                api.make_handle_resident(handle, false);
            }
        }
    }

    /// Destroys everything.
    pub fn destroy_all<A: GlApi>(&mut self, api: &mut A) {
        self.texture_handles
            .drain(|_, handle| api.make_handle_resident(handle, false));
        self.samplers.drain(|_, sampler| api.delete_sampler(sampler));
        self.vaos.drain(|_, vao| api.delete_vertex_array(vao));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::gl::headless::{GlCall, HeadlessGl};

    #[test]
    fn test_entries_expire_after_delay() {
        let mut cache: ResidencyCache<u32, u32> = ResidencyCache::new("test", 3);
        cache.get_or_insert_with(1, 0, || 10);
        cache.get_or_insert_with(2, 0, || 20);
        cache.touch(&2, 2);

        let mut destroyed = Vec::new();
        assert_eq!(cache.evict_unused(2, |k, _| destroyed.push(k)), 0);
        assert_eq!(cache.evict_unused(3, |k, _| destroyed.push(k)), 1);
        assert_eq!(destroyed, vec![1]);
        assert_eq!(cache.get(&2), Some(20));
        assert_eq!(cache.evict_unused(5, |k, _| destroyed.push(k)), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_samplers_are_shared_by_hash() {
        let mut gl = HeadlessGl::new();
        let mut caches = ResidencyCaches::new(3);
        let descriptor = SamplerDescriptor::default();
        let a = caches.sampler(&mut gl, &descriptor, 0);
        let b = caches.sampler(&mut gl, &descriptor, 1);
        assert_eq!(a, b);
        assert_eq!(gl.count(|c| matches!(c, GlCall::CreateSampler(_))), 1);
    }

    #[test]
    fn test_texture_handles_become_non_resident_on_eviction() {
        let mut gl = HeadlessGl::new();
        let mut caches = ResidencyCaches::new(2);
        let handle = caches.make_resident(&mut gl, TextureId(4), SamplerObject(1), 0);
        assert_eq!(caches.evict_unused(&mut gl, 2), 1);
        assert!(gl
            .calls()
            .contains(&GlCall::MakeHandleResident(handle, false)));
    }
}

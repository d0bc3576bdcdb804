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

//! Bounded cache of texture views.
//!
//! Views are keyed by their descriptor and reference counted. A view whose
//! count drops to zero stays cached, and only becomes recyclable
//! `recycle_delay` frames after its release.

use super::api::GlApi;
use ahash::AHashMap;
use kiln_core::renderer::resources::TextureViewDescriptor;
use kiln_core::renderer::{ResourceError, TextureId};

#[derive(Debug)]
struct ViewEntry {
    view: TextureId,
    ref_count: u32,
    released_frame: Option<u64>,
}

/// Reference-counted texture views with frame-delayed recycling.
#[derive(Debug)]
pub struct TextureViewCache {
    capacity: usize,
    recycle_delay: u64,
    entries: AHashMap<TextureViewDescriptor, ViewEntry>,
    by_view: AHashMap<TextureId, TextureViewDescriptor>,
    views_created: u32,
}

impl TextureViewCache {
    /// Creates a cache holding at most `capacity` views.
    pub fn new(capacity: usize, recycle_delay: u64) -> Self {
        Self {
            capacity,
            recycle_delay,
            entries: AHashMap::new(),
            by_view: AHashMap::new(),
            views_created: 0,
        }
    }

    /// Returns a view matching `descriptor` and takes a reference on it.
    ///
    /// Reuses a cached view when one exists; otherwise creates one, recycling
    /// the longest-released view if the cache is full.
    ///
    /// # Errors
    ///
    /// [`ResourceError::PoolExhausted`] if the cache is full and no view is recyclable yet.
    pub fn acquire<A: GlApi>(
        &mut self,
        api: &mut A,
        descriptor: &TextureViewDescriptor,
        frame: u64,
    ) -> Result<TextureId, ResourceError> {
        if let Some(entry) = self.entries.get_mut(descriptor) {
            entry.ref_count += 1;
            entry.released_frame = None;
            return Ok(entry.view);
        }

        if self.entries.len() >= self.capacity {
            let delay = self.recycle_delay;
            let victim = self
                .entries
                .iter()
                .filter_map(|(key, entry)| match entry.released_frame {
                    Some(released) if entry.ref_count == 0 && released + delay <= frame => {
                        Some((released, *key))
                    }
                    _ => None,
                })
                .min_by_key(|(released, _)| *released)
                .map(|(_, key)| key)
                .ok_or(ResourceError::PoolExhausted {
                    pool: "texture view",
                    capacity: self.capacity,
                })?;
            self.destroy(api, &victim);
        }

        let view = api.create_texture_view(descriptor);
        self.views_created += 1;
        self.entries.insert(
            *descriptor,
            ViewEntry {
                view,
                ref_count: 1,
                released_frame: None,
            },
        );
        self.by_view.insert(view, *descriptor);
        Ok(view)
    }

    /// Drops one reference on `view`.
    ///
    /// # Panics
    ///
    /// Panics if `view` is not a cached view or holds no references.
    pub fn release(&mut self, view: TextureId, frame: u64) {
        let entry = self
            .by_view
            .get(&view)
            .and_then(|descriptor| self.entries.get_mut(descriptor));
        let Some(entry) = entry else {
            panic!("released {view:?}, which is not a cached texture view");
        };
        assert!(entry.ref_count > 0, "{view:?} released more often than acquired");
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            entry.released_frame = Some(frame);
        }
    }

    /// Destroys every unreferenced view regardless of its release frame.
    ///
    /// Only valid once the GPU is idle. Returns the number of views destroyed.
    pub fn force_reclaim<A: GlApi>(&mut self, api: &mut A) -> usize {
        let idle: Vec<TextureViewDescriptor> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.ref_count == 0)
            .map(|(key, _)| *key)
            .collect();
        for key in &idle {
            self.destroy(api, key);
        }
        idle.len()
    }

    /// Destroys every view of `source`, e.g. before the texture itself is deleted.
    pub fn forget_source<A: GlApi>(&mut self, api: &mut A, source: TextureId) {
        let views: Vec<TextureViewDescriptor> = self
            .entries
            .keys()
            .filter(|key| key.source == source)
            .copied()
            .collect();
        for key in &views {
            self.destroy(api, key);
        }
    }

    /// Destroys every view.
    pub fn destroy_all<A: GlApi>(&mut self, api: &mut A) {
        for (_, entry) in self.entries.drain() {
            api.delete_texture(entry.view);
        }
        self.by_view.clear();
    }

    fn destroy<A: GlApi>(&mut self, api: &mut A, key: &TextureViewDescriptor) {
        if let Some(entry) = self.entries.remove(key) {
            self.by_view.remove(&entry.view);
            api.delete_texture(entry.view);
        }
    }

    /// Number of cached views.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no view is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns and resets the number of views created.
    pub fn take_views_created(&mut self) -> u32 {
        std::mem::take(&mut self.views_created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::gl::headless::{GlCall, HeadlessGl};
    use kiln_core::renderer::resources::{SubresourceRange, TextureFormat, TextureTarget};

    fn view_of(source: u32, base_mip: u16) -> TextureViewDescriptor {
        TextureViewDescriptor {
            source: TextureId(source),
            target: TextureTarget::Texture2D,
            format: TextureFormat::Rgba8Unorm,
            range: SubresourceRange {
                base_mip,
                mip_count: 1,
                base_layer: 0,
                layer_count: 1,
            },
        }
    }

    #[test]
    fn test_identical_descriptors_share_a_view() {
        let mut gl = HeadlessGl::new();
        let mut cache = TextureViewCache::new(4, 3);
        let a = cache.acquire(&mut gl, &view_of(1, 0), 0).unwrap();
        let b = cache.acquire(&mut gl, &view_of(1, 0), 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.take_views_created(), 1);
    }

    #[test]
    fn test_released_views_recycle_after_delay() {
        let mut gl = HeadlessGl::new();
        let mut cache = TextureViewCache::new(1, 3);
        let first = cache.acquire(&mut gl, &view_of(1, 0), 0).unwrap();
        cache.release(first, 0);

        let err = cache.acquire(&mut gl, &view_of(1, 1), 2).unwrap_err();
        assert!(matches!(err, ResourceError::PoolExhausted { capacity: 1, .. }));

        let second = cache.acquire(&mut gl, &view_of(1, 1), 3).unwrap();
        assert_ne!(first, second);
        assert!(gl.calls().contains(&GlCall::DeleteTexture(first)));
    }

    #[test]
    fn test_referenced_views_are_never_recycled() {
        let mut gl = HeadlessGl::new();
        let mut cache = TextureViewCache::new(1, 0);
        cache.acquire(&mut gl, &view_of(1, 0), 0).unwrap();
        assert_eq!(cache.force_reclaim(&mut gl), 0);
        assert!(cache.acquire(&mut gl, &view_of(1, 1), 10).is_err());
    }

    #[test]
    #[should_panic(expected = "released more often than acquired")]
    fn test_double_release_panics() {
        let mut gl = HeadlessGl::new();
        let mut cache = TextureViewCache::new(1, 0);
        let view = cache.acquire(&mut gl, &view_of(1, 0), 0).unwrap();
        cache.release(view, 0);
        cache.release(view, 0);
    }
}

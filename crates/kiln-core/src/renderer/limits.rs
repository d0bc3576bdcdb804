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

//! Hardware limits reported by the backend.

/// Limits that dispatch asserts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Color attachments per framebuffer.
    pub max_color_attachments: u32,
    /// Texture units usable by one program.
    pub max_texture_units: u32,
    /// Image units usable by one program.
    pub max_image_units: u32,
    /// Indexed uniform and storage binding points.
    pub max_buffer_bindings: u32,
    /// User clip planes.
    pub max_clip_planes: u32,
    /// Work groups per dispatch, per dimension.
    pub max_compute_work_group_count: [u32; 3],
    /// Local work group size, per dimension.
    pub max_compute_work_group_size: [u32; 3],
    /// Total invocations of one work group.
    pub max_compute_work_group_invocations: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        // The minimums guaranteed by a core 4.6 context.
        Self {
            max_color_attachments: 8,
            max_texture_units: 32,
            max_image_units: 8,
            max_buffer_bindings: 36,
            max_clip_planes: 8,
            max_compute_work_group_count: [65535, 65535, 65535],
            max_compute_work_group_size: [1024, 1024, 64],
            max_compute_work_group_invocations: 1024,
        }
    }
}

impl DeviceLimits {
    /// Asserts that a dispatch of `work_groups` groups of `local_size` fits the device.
    ///
    /// # Panics
    ///
    /// Panics naming the exceeded limit.
    pub fn assert_compute_dispatch(&self, work_groups: [u32; 3], local_size: [u32; 3]) {
        for axis in 0..3 {
            assert!(
                work_groups[axis] <= self.max_compute_work_group_count[axis],
                "compute dispatch exceeds the device work group count on axis {axis}: {} > {}",
                work_groups[axis],
                self.max_compute_work_group_count[axis]
            );
            assert!(
                local_size[axis] <= self.max_compute_work_group_size[axis],
                "compute dispatch exceeds the device work group size on axis {axis}: {} > {}",
                local_size[axis],
                self.max_compute_work_group_size[axis]
            );
        }
        let invocations: u64 = local_size.iter().map(|&s| s as u64).product();
        assert!(
            invocations <= self.max_compute_work_group_invocations as u64,
            "compute dispatch exceeds the device work group invocations: {invocations} > {}",
            self.max_compute_work_group_invocations
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_within_limits() {
        DeviceLimits::default().assert_compute_dispatch([64, 64, 1], [8, 8, 1]);
    }

    #[test]
    #[should_panic(expected = "work group count on axis 1")]
    fn test_dispatch_count_over_limit_panics() {
        DeviceLimits::default().assert_compute_dispatch([1, 70_000, 1], [1, 1, 1]);
    }

    #[test]
    #[should_panic(expected = "invocations")]
    fn test_dispatch_invocations_over_limit_panics() {
        DeviceLimits::default().assert_compute_dispatch([1, 1, 1], [32, 32, 2]);
    }
}

use crate::engine::config::GridConfig;
use itertools::iproduct;
use nalgebra::Point3;
use std::ops::Range;
use tracing::trace;

/// Hard ceiling on the number of voxels a grid may allocate.
const MAX_VOXELS: usize = 1 << 22;
/// Edge length used when every point coincides.
const FALLBACK_VOXEL_SIZE: f64 = 1.0;

pub type VoxelIndex = [usize; 3];
pub type VirtualIndex = [i64; 3];

/// A uniform grid of cubic voxels over the bounding box of a point set.
///
/// Each voxel holds the payloads of the points that fall inside it. Voxel
/// indices outside the grid are representable as [`VirtualIndex`] values so
/// that points lying outside the box can still be used as query centers.
#[derive(Debug, Clone)]
pub struct SpatialGrid<T> {
    origin: Point3<f64>,
    voxel_size: f64,
    extent: [usize; 3],
    voxels: Vec<Vec<T>>,
}

impl<T: Copy> SpatialGrid<T> {
    /// Builds a grid whose voxel edge targets `config.target_occupancy` points per voxel.
    pub fn build(entries: &[(T, Point3<f64>)], config: &GridConfig) -> Self {
        let voxel_size = occupancy_voxel_size(entries, config.target_occupancy);
        Self::assemble(entries, voxel_size)
    }

    /// Builds a grid with a caller-chosen voxel edge.
    ///
    /// Non-positive or non-finite sizes fall back to the occupancy-based edge.
    pub fn build_with_voxel_size(entries: &[(T, Point3<f64>)], voxel_size: f64) -> Self {
        if voxel_size.is_finite() && voxel_size > 0.0 {
            Self::assemble(entries, voxel_size)
        } else {
            Self::build(entries, &GridConfig::default())
        }
    }

    fn assemble(entries: &[(T, Point3<f64>)], voxel_size: f64) -> Self {
        let (min, max) = bounds(entries);
        let span: [f64; 3] = (max - min).into();
        let mut voxel_size = voxel_size;
        let mut extent = extent_for(span, voxel_size);
        while voxel_count(extent).is_none_or(|count| count > MAX_VOXELS) {
            voxel_size *= 2.0;
            extent = extent_for(span, voxel_size);
        }

        let mut grid = Self {
            origin: min,
            voxel_size,
            extent,
            voxels: vec![Vec::new(); extent[0] * extent[1] * extent[2]],
        };
        for (payload, point) in entries {
            let index = grid.clamped_index(point);
            let linear = grid.linear(index);
            grid.voxels[linear].push(*payload);
        }
        trace!(
            points = entries.len(),
            voxel_size = grid.voxel_size,
            extent = ?grid.extent,
            "Built spatial grid"
        );
        grid
    }
}

impl<T> SpatialGrid<T> {
    pub fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    pub fn extent(&self) -> [usize; 3] {
        self.extent
    }

    pub fn number_of_voxels(&self) -> usize {
        self.voxels.len()
    }

    /// The voxel a point falls in, without clamping to the grid.
    pub fn virtual_index(&self, point: &Point3<f64>) -> VirtualIndex {
        let relative = (point.coords - self.origin.coords) / self.voxel_size;
        // `as` saturates, so points arbitrarily far away stay representable.
        [
            relative.x.floor() as i64,
            relative.y.floor() as i64,
            relative.z.floor() as i64,
        ]
    }

    /// Converts a virtual index into a real one, or `None` if it lies outside the grid.
    pub fn real_index(&self, index: VirtualIndex) -> Option<VoxelIndex> {
        let mut real = [0usize; 3];
        for axis in 0..3 {
            let value = usize::try_from(index[axis]).ok()?;
            if value >= self.extent[axis] {
                return None;
            }
            real[axis] = value;
        }
        Some(real)
    }

    pub fn voxel(&self, index: VoxelIndex) -> &[T] {
        if (0..3).any(|axis| index[axis] >= self.extent[axis]) {
            return &[];
        }
        &self.voxels[self.linear(index)]
    }

    pub fn non_empty_voxels(&self) -> impl Iterator<Item = (VoxelIndex, &[T])> + '_ {
        let [_, ny, nz] = self.extent;
        self.voxels
            .iter()
            .enumerate()
            .filter(|(_, members)| !members.is_empty())
            .map(move |(linear, members)| {
                let index = [linear / (ny * nz), (linear / nz) % ny, linear % nz];
                (index, members.as_slice())
            })
    }

    /// Enumerates the real voxels within `radius` of `center`.
    ///
    /// The cube searched has a half-width of `ceil(radius / voxel_size) + 1`
    /// voxels, clipped to the grid. With `skip_lower`, voxels that compare
    /// lexicographically less than or equal to `center` are omitted, so that
    /// visiting every voxel as a center touches each voxel pair once.
    pub fn voxels_near(
        &self,
        center: VirtualIndex,
        radius: f64,
        skip_lower: bool,
    ) -> impl Iterator<Item = VoxelIndex> + '_ {
        let reach = self.reach(radius);
        let [rx, ry, rz] = [0, 1, 2].map(|axis| self.axis_range(center[axis], reach, axis));
        iproduct!(rx, ry, rz)
            .map(|(i, j, k)| [i, j, k])
            .filter(move |index| !skip_lower || virtual_of(*index) > center)
    }

    /// Every payload stored in the voxels returned by [`Self::voxels_near`].
    pub fn query_near(
        &self,
        center: VirtualIndex,
        radius: f64,
        skip_lower: bool,
    ) -> impl Iterator<Item = &T> + '_ {
        self.voxels_near(center, radius, skip_lower)
            .flat_map(move |index| self.voxel(index).iter())
    }

    fn reach(&self, radius: f64) -> f64 {
        (radius.max(0.0) / self.voxel_size).ceil() + 1.0
    }

    // Computed in floating point so that huge radii or far-away centers clip
    // to the grid instead of overflowing voxel arithmetic.
    fn axis_range(&self, center: i64, reach: f64, axis: usize) -> Range<usize> {
        let center = center as f64;
        let last = (self.extent[axis] - 1) as f64;
        let low = (center - reach).max(0.0);
        let high = (center + reach).min(last);
        if low > high {
            0..0
        } else {
            low as usize..high as usize + 1
        }
    }

    fn clamped_index(&self, point: &Point3<f64>) -> VoxelIndex {
        let virtual_index = self.virtual_index(point);
        [0, 1, 2].map(|axis| virtual_index[axis].clamp(0, self.extent[axis] as i64 - 1) as usize)
    }

    fn linear(&self, index: VoxelIndex) -> usize {
        let [_, ny, nz] = self.extent;
        (index[0] * ny + index[1]) * nz + index[2]
    }
}

fn virtual_of(index: VoxelIndex) -> VirtualIndex {
    index.map(|value| value as i64)
}

fn bounds<T>(entries: &[(T, Point3<f64>)]) -> (Point3<f64>, Point3<f64>) {
    // Infinite coordinates are clamped into the border voxels rather than stretching the box.
    let mut iter = entries
        .iter()
        .map(|(_, point)| point)
        .filter(|point| point.coords.iter().all(|value| value.is_finite()));
    let Some(first) = iter.next() else {
        return (Point3::origin(), Point3::origin());
    };
    iter.fold((*first, *first), |(min, max), point| {
        (min.inf(point), max.sup(point))
    })
}

fn voxel_count(extent: [usize; 3]) -> Option<usize> {
    extent[0].checked_mul(extent[1])?.checked_mul(extent[2])
}

fn extent_for(span: [f64; 3], voxel_size: f64) -> [usize; 3] {
    span.map(|length| {
        let cells = (length / voxel_size).floor() + 1.0;
        if cells.is_finite() && cells < MAX_VOXELS as f64 {
            cells as usize
        } else {
            MAX_VOXELS
        }
    })
}

fn occupancy_voxel_size<T>(entries: &[(T, Point3<f64>)], target_occupancy: f64) -> f64 {
    let (min, max) = bounds(entries);
    let span: [f64; 3] = (max - min).into();
    let longest = span.iter().copied().fold(0.0, f64::max);
    if entries.is_empty() || longest <= 0.0 {
        return FALLBACK_VOXEL_SIZE;
    }

    let occupancy = if target_occupancy > 0.0 { target_occupancy } else { 1.0 };
    let target_voxels = (entries.len() as f64 / occupancy).ceil().max(1.0);
    // Measure the set only in the dimensions it meaningfully spans. An axis
    // thinner than the resulting edge is one voxel thick and must not shrink it.
    let mut spanned: Vec<f64> = span.iter().copied().filter(|length| *length > 0.0).collect();
    spanned.sort_by(|a, b| b.total_cmp(a));
    let mut size = spanned_edge(&spanned, target_voxels);
    while spanned.len() > 1 && spanned.last().is_some_and(|thinnest| *thinnest < size) {
        spanned.pop();
        size = spanned_edge(&spanned, target_voxels);
    }
    if size.is_finite() && size > 0.0 {
        size
    } else {
        longest
    }
}

fn spanned_edge(spanned: &[f64], target_voxels: f64) -> f64 {
    let measure: f64 = spanned.iter().product();
    (measure / target_voxels).powf(1.0 / spanned.len() as f64)
}

//! Shared patch meshes for clipmap rendering
//!
//! All patches live in one vertex buffer of local grid coordinates and one index
//! buffer. A draw reads a patch by its [`PatchRange`] and places it with the
//! per-instance scale and translation.

use bytemuck::{Pod, Zeroable};
use glam::IVec2;
use strata_core::Result;

use crate::layout::ClipmapLayout;
use crate::level::InteriorTrim;

/// The nine patch types, in emission order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PatchKind {
    FinestInterior,
    Block,
    Trim(InteriorTrim),
    VerticalGap,
    HorizontalGap,
    Crack,
}

impl PatchKind {
    pub const COUNT: usize = 9;

    pub const ALL: [PatchKind; PatchKind::COUNT] = [
        PatchKind::FinestInterior,
        PatchKind::Block,
        PatchKind::Trim(InteriorTrim::TopLeft),
        PatchKind::Trim(InteriorTrim::TopRight),
        PatchKind::Trim(InteriorTrim::BottomLeft),
        PatchKind::Trim(InteriorTrim::BottomRight),
        PatchKind::VerticalGap,
        PatchKind::HorizontalGap,
        PatchKind::Crack,
    ];

    /// Position in [`PatchKind::ALL`]
    pub fn index(self) -> usize {
        match self {
            PatchKind::FinestInterior => 0,
            PatchKind::Block => 1,
            PatchKind::Trim(InteriorTrim::TopLeft) => 2,
            PatchKind::Trim(InteriorTrim::TopRight) => 3,
            PatchKind::Trim(InteriorTrim::BottomLeft) => 4,
            PatchKind::Trim(InteriorTrim::BottomRight) => 5,
            PatchKind::VerticalGap => 6,
            PatchKind::HorizontalGap => 7,
            PatchKind::Crack => 8,
        }
    }

    /// Base RGBA tint for debug visualisation
    pub fn debug_color(self) -> [u8; 4] {
        match self {
            PatchKind::FinestInterior => [255, 255, 255, 255],
            PatchKind::Block => [64, 160, 64, 255],
            PatchKind::Trim(_) => [220, 180, 40, 255],
            PatchKind::VerticalGap => [60, 120, 220, 255],
            PatchKind::HorizontalGap => [40, 200, 200, 255],
            PatchKind::Crack => [220, 40, 40, 255],
        }
    }
}

/// One patch inside the shared buffers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchRange {
    pub base_vertex: i32,
    pub first_index: u32,
    pub index_count: u32,
}

/// Vertex of a patch: integer grid coordinates in quads
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct PatchVertex {
    pub position: [u16; 2],
}

/// Provider of the draw ranges for each patch type
pub trait PatchMeshes: Send + Sync {
    fn range(&self, kind: PatchKind) -> PatchRange;

    /// Clipmap size the patches were built for
    fn clipmap_size(&self) -> u32;
}

#[derive(Default)]
struct MeshBuilder {
    vertices: Vec<PatchVertex>,
    indices: Vec<u32>,
    base_vertex: usize,
    first_index: usize,
}

impl MeshBuilder {
    fn begin(&mut self) {
        self.base_vertex = self.vertices.len();
        self.first_index = self.indices.len();
    }

    fn finish(&mut self) -> PatchRange {
        PatchRange {
            base_vertex: self.base_vertex as i32,
            first_index: self.first_index as u32,
            index_count: (self.indices.len() - self.first_index) as u32,
        }
    }

    fn push_vertex(&mut self, x: i32, z: i32) -> u32 {
        let local = (self.vertices.len() - self.base_vertex) as u32;
        self.vertices.push(PatchVertex {
            position: [x as u16, z as u16],
        });
        local
    }

    /// A `width` x `depth` quad grid starting at `origin`, two triangles per quad (CCW from +Y)
    fn grid(&mut self, origin: IVec2, width: i32, depth: i32) {
        let first = (self.vertices.len() - self.base_vertex) as u32;
        let verts_per_row = width as u32 + 1;

        for vz in 0..=depth {
            for vx in 0..=width {
                self.push_vertex(origin.x + vx, origin.y + vz);
            }
        }

        for qz in 0..depth as u32 {
            for qx in 0..width as u32 {
                let tl = first + qz * verts_per_row + qx;
                let tr = tl + 1;
                let bl = tl + verts_per_row;
                let br = bl + 1;

                self.indices.extend_from_slice(&[tl, bl, br, tl, br, tr]);
            }
        }
    }

    /// Degenerate triangles along one edge: every even vertex pair and the odd vertex between
    fn crack_edge(&mut self, start: IVec2, step: IVec2, quads: i32) {
        let first = (self.vertices.len() - self.base_vertex) as u32;
        for k in 0..=quads {
            let p = start + step * k;
            self.push_vertex(p.x, p.y);
        }
        for k in (0..quads as u32).step_by(2) {
            self.indices
                .extend_from_slice(&[first + k, first + k + 2, first + k + 1]);
        }
    }
}

/// The patch set for one clipmap size
pub struct ClipmapMeshes {
    size: u32,
    vertices: Vec<PatchVertex>,
    indices: Vec<u32>,
    ranges: [PatchRange; PatchKind::COUNT],
}

impl ClipmapMeshes {
    pub fn new(size: u32) -> Result<Self> {
        let layout = ClipmapLayout::new(size)?;
        let t = layout.block_size();
        let g = layout.grid_size();
        let e = layout.hole_size();
        let n = layout.interior_size();

        let mut builder = MeshBuilder::default();
        let mut ranges = [PatchRange::default(); PatchKind::COUNT];

        for kind in PatchKind::ALL {
            builder.begin();
            match kind {
                PatchKind::FinestInterior => {
                    // One-quad L along the low X and low Z sides
                    builder.grid(IVec2::ZERO, 1, n);
                    builder.grid(IVec2::new(1, 0), n - 1, 1);
                }
                PatchKind::Block => builder.grid(IVec2::ZERO, t, t),
                PatchKind::Trim(trim) => {
                    let column = if trim.is_left() { 0 } else { e - 1 };
                    let row = if trim.is_top() { 0 } else { e - 1 };
                    let row_start = if trim.is_left() { 1 } else { 0 };
                    builder.grid(IVec2::new(column, 0), 1, e);
                    builder.grid(IVec2::new(row_start, row), e - 1, 1);
                }
                PatchKind::VerticalGap => {
                    let extent = layout.vertical_gap_extent();
                    builder.grid(IVec2::ZERO, extent.x, extent.y);
                }
                PatchKind::HorizontalGap => {
                    let extent = layout.horizontal_gap_extent();
                    builder.grid(IVec2::ZERO, extent.x, extent.y);
                }
                PatchKind::Crack => {
                    builder.crack_edge(IVec2::ZERO, IVec2::X, g);
                    builder.crack_edge(IVec2::new(g, 0), IVec2::Y, g);
                    builder.crack_edge(IVec2::new(g, g), IVec2::NEG_X, g);
                    builder.crack_edge(IVec2::new(0, g), IVec2::NEG_Y, g);
                }
            }
            ranges[kind.index()] = builder.finish();
        }

        Ok(Self {
            size,
            vertices: builder.vertices,
            indices: builder.indices,
            ranges,
        })
    }

    pub fn vertices(&self) -> &[PatchVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Local vertices of one patch, with their indices resolved
    pub fn patch_triangles(&self, kind: PatchKind) -> impl Iterator<Item = [IVec2; 3]> + '_ {
        let range = self.ranges[kind.index()];
        let start = range.first_index as usize;
        let end = start + range.index_count as usize;
        self.indices[start..end].chunks_exact(3).map(move |tri| {
            [tri[0], tri[1], tri[2]].map(|i| {
                let v = self.vertices[range.base_vertex as usize + i as usize].position;
                IVec2::new(v[0] as i32, v[1] as i32)
            })
        })
    }
}

impl PatchMeshes for ClipmapMeshes {
    fn range(&self, kind: PatchKind) -> PatchRange {
        self.ranges[kind.index()]
    }

    fn clipmap_size(&self) -> u32 {
        self.size
    }
}

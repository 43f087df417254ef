use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounds of an object's geometry in object space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self::new(*first, *first);
        for &p in rest {
            bounds.min = bounds.min.min(p);
            bounds.max = bounds.max.max(p);
        }
        Some(bounds)
    }

    /// Half-extents along each local axis.
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// Polygon mesh: shared vertex positions plus faces of three or more corners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<Vec<u32>>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vec3>, faces: Vec<Vec<u32>>) -> Self {
        Self { vertices, faces }
    }

    /// Axis-aligned box made of six quads, centered on the origin.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        let vertices = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let faces = vec![
            vec![0, 3, 2, 1],
            vec![4, 5, 6, 7],
            vec![0, 1, 5, 4],
            vec![1, 2, 6, 5],
            vec![2, 3, 7, 6],
            vec![3, 0, 4, 7],
        ];
        Self::new(vertices, faces)
    }

    /// Single quad in the XY plane.
    pub fn plane(half_x: f32, half_y: f32) -> Self {
        Self::new(
            vec![
                Vec3::new(-half_x, -half_y, 0.0),
                Vec3::new(half_x, -half_y, 0.0),
                Vec3::new(half_x, half_y, 0.0),
                Vec3::new(-half_x, half_y, 0.0),
            ],
            vec![vec![0, 1, 2, 3]],
        )
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Fan-splits every face into triangles, skipping faces that reference
    /// missing vertices or have fewer than three corners.
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        let vertex_count = self.vertices.len() as u32;
        let mut triangles = Vec::new();
        for face in &self.faces {
            if face.len() < 3 || face.iter().any(|&v| v >= vertex_count) {
                continue;
            }
            for i in 1..face.len() - 1 {
                triangles.push([face[0], face[i], face[i + 1]]);
            }
        }
        triangles
    }

    pub fn bounds(&self) -> Option<BoundBox> {
        BoundBox::from_points(&self.vertices)
    }
}

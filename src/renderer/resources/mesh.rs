use std::collections::HashMap;
use std::path::Path;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use glam::{Vec2, Vec3};
use crate::renderer::shader_data::Vertex;

/// Indexed triangle list in CPU memory
#[derive(Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
        }
    }

    pub fn new_from_obj_file(path: &Path) -> Result<Self> {
        let (models, _materials) = tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS)
            .wrap_err_with(|| format!("Failed to load model {}", path.display()))?;
        let mesh = Self::new_from_obj_models(&models)?;
        log::info!(
            "Loaded model {} ({} vertices, {} indices)",
            path.display(),
            mesh.vertices.len(),
            mesh.indices.len(),
        );
        Ok(mesh)
    }

    /// Flattens every model into one white mesh, merging bitwise identical vertices.
    /// Texture V is flipped so image rows run top to bottom.
    pub fn new_from_obj_models(models: &[tobj::Model]) -> Result<Self> {
        let mut mesh = Self::default();
        let mut unique_vertices: HashMap<[u32; 8], u32> = HashMap::new();

        for model in models {
            let obj = &model.mesh;
            let has_texcoords = !obj.texcoords.is_empty();

            for &index in &obj.indices {
                let i = index as usize;
                let position = obj.positions
                    .get(3 * i..3 * i + 3)
                    .ok_or_else(|| eyre!("Model {} has an out of range vertex index {}", model.name, index))?;
                let texcoord = if has_texcoords {
                    let uv = obj.texcoords
                        .get(2 * i..2 * i + 2)
                        .ok_or_else(|| eyre!("Model {} has an out of range texcoord index {}", model.name, index))?;
                    Vec2::new(uv[0], 1.0 - uv[1])
                } else {
                    Vec2::ZERO
                };

                let vertex = Vertex::new(
                    Vec3::new(position[0], position[1], position[2]),
                    Vec3::ONE,
                    texcoord,
                );

                let next_index = mesh.vertices.len() as u32;
                let index = *unique_vertices.entry(vertex.bit_key()).or_insert_with(|| {
                    mesh.vertices.push(vertex);
                    next_index
                });
                mesh.indices.push(index);
            }
        }

        if mesh.indices.is_empty() {
            return Err(eyre!("Model contains no triangles"));
        }
        Ok(mesh)
    }

    /// Two overlapping quads half a unit apart along Z, for checking the depth test
    pub fn new_depth_quads() -> Self {
        let corners = [
            ([-0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
            ([0.5, -0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
            ([0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
            ([-0.5, 0.5], [1.0, 1.0, 1.0], [1.0, 1.0]),
        ];

        let mut vertices = Vec::with_capacity(8);
        let mut indices = Vec::with_capacity(12);
        for z in [0.0, -0.5] {
            let base = vertices.len() as u32;
            vertices.extend(corners.iter().map(|(xy, color, uv)| {
                Vertex::new(
                    Vec3::new(xy[0], xy[1], z),
                    Vec3::from_array(*color),
                    Vec2::from_array(*uv),
                )
            }));
            indices.extend([0, 1, 2, 2, 3, 0].map(|i| base + i));
        }

        Self::new(vertices, indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(positions: Vec<f32>, texcoords: Vec<f32>, indices: Vec<u32>) -> tobj::Model {
        tobj::Model::new(
            tobj::Mesh {
                positions,
                texcoords,
                indices,
                ..Default::default()
            },
            "test".into(),
        )
    }

    #[test]
    fn shared_corners_are_merged() {
        // Two triangles of a quad, each listing its corners separately
        let quad = model(
            vec![
                0.0, 0.0, 0.0,  1.0, 0.0, 0.0,  1.0, 1.0, 0.0,
                1.0, 1.0, 0.0,  0.0, 1.0, 0.0,  0.0, 0.0, 0.0,
            ],
            vec![
                0.0, 0.0,  1.0, 0.0,  1.0, 1.0,
                1.0, 1.0,  0.0, 1.0,  0.0, 0.0,
            ],
            vec![0, 1, 2, 3, 4, 5],
        );
        let mesh = Mesh::new_from_obj_models(&[quad]).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 3, 0]);
    }

    #[test]
    fn differing_texcoords_stay_separate() {
        let seam = model(
            vec![0.0, 0.0, 0.0,  0.0, 0.0, 0.0,  1.0, 0.0, 0.0],
            vec![0.0, 0.0,  0.5, 0.0,  1.0, 0.0],
            vec![0, 1, 2],
        );
        let mesh = Mesh::new_from_obj_models(&[seam]).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
    }

    #[test]
    fn texcoord_v_is_flipped_and_color_is_white() {
        let tri = model(
            vec![0.0, 0.0, 0.0,  1.0, 0.0, 0.0,  0.0, 1.0, 0.0],
            vec![0.25, 0.0,  0.5, 0.25,  1.0, 1.0],
            vec![0, 1, 2],
        );
        let mesh = Mesh::new_from_obj_models(&[tri]).unwrap();
        assert_eq!(mesh.vertices[0].texcoord, Vec2::new(0.25, 1.0));
        assert_eq!(mesh.vertices[1].texcoord, Vec2::new(0.5, 0.75));
        assert_eq!(mesh.vertices[2].texcoord, Vec2::new(1.0, 0.0));
        assert!(mesh.vertices.iter().all(|v| v.color == Vec3::ONE));
    }

    #[test]
    fn parses_obj_text() {
        let obj = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";
        let (models, _) = tobj::load_obj_buf(
            &mut obj.as_bytes(),
            &tobj::GPU_LOAD_OPTIONS,
            |_| Err(tobj::LoadError::OpenFileFailed),
        ).unwrap();
        let mesh = Mesh::new_from_obj_models(&models).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let broken = model(vec![0.0, 0.0, 0.0], vec![], vec![0, 1, 2]);
        assert!(Mesh::new_from_obj_models(&[broken]).is_err());
    }

    #[test]
    fn empty_model_is_an_error() {
        assert!(Mesh::new_from_obj_models(&[]).is_err());
    }

    #[test]
    fn depth_quads_sit_at_two_depths() {
        let mesh = Mesh::new_depth_quads();
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.indices.len(), 12);
        assert!(mesh.vertices[..4].iter().all(|v| v.position.z == 0.0));
        assert!(mesh.vertices[4..].iter().all(|v| v.position.z == -0.5));
        assert_eq!(&mesh.indices[6..], &[4, 5, 6, 6, 7, 4]);
    }
}

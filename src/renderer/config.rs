use std::ffi::CString;
use std::path::PathBuf;
use ash::vk;

/// Where the drawn geometry and its texture come from
#[derive(Debug, Clone, PartialEq)]
pub enum SceneSource {
    /// Wavefront OBJ mesh textured with an image file
    Model {
        mesh_path: PathBuf,
        texture_path: PathBuf,
    },
    /// Two overlapping quads textured with a generated checkerboard
    DepthQuads,
}

impl SceneSource {
    /// The scene that can actually be loaded: a model whose files are
    /// missing falls back to the built-in quads
    pub fn resolve(&self) -> SceneSource {
        match self {
            SceneSource::Model { mesh_path, texture_path } => {
                let missing: Vec<_> = [mesh_path, texture_path]
                    .into_iter()
                    .filter(|path| !path.is_file())
                    .collect();
                if missing.is_empty() {
                    return self.clone();
                }
                for path in missing {
                    log::warn!("Model asset {:?} not found", path);
                }
                log::warn!("Falling back to the built-in depth quads");
                SceneSource::DepthQuads
            }
            SceneSource::DepthQuads => SceneSource::DepthQuads,
        }
    }
}

/// Contains configuration options for the renderer like the window size, validation, and assets
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,

    /// Number of frames that may be recorded while the GPU still works on previous ones
    pub frames_in_flight: usize,

    pub enable_validation: bool,
    pub validation_layers: Vec<CString>,
    // When false, layers the loader does not know about are skipped with a warning
    pub require_validation_layers: bool,
    pub debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,

    pub shader_path: PathBuf,
    pub scene: SceneSource,
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_title: "vkspin".into(),
            window_width: 800,
            window_height: 600,

            frames_in_flight: 2,

            enable_validation: cfg!(debug_assertions),
            validation_layers: vec![c"VK_LAYER_KHRONOS_validation".to_owned()],
            require_validation_layers: false,
            debug_message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,

            shader_path: PathBuf::from("shaders-built/model.spv"),
            scene: SceneSource::Model {
                mesh_path: PathBuf::from("assets/models/viking_room.obj"),
                texture_path: PathBuf::from("assets/textures/viking_room.png"),
            },
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_file(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(name)
    }

    #[test]
    fn present_model_is_kept() {
        let scene = SceneSource::Model {
            mesh_path: manifest_file("Cargo.toml"),
            texture_path: manifest_file("build.rs"),
        };
        assert_eq!(scene.resolve(), scene);
    }

    #[test]
    fn missing_mesh_falls_back_to_quads() {
        let scene = SceneSource::Model {
            mesh_path: manifest_file("assets/models/missing.obj"),
            texture_path: manifest_file("Cargo.toml"),
        };
        assert_eq!(scene.resolve(), SceneSource::DepthQuads);
    }

    #[test]
    fn missing_texture_falls_back_to_quads() {
        let scene = SceneSource::Model {
            mesh_path: manifest_file("Cargo.toml"),
            texture_path: manifest_file("assets/textures/missing.png"),
        };
        assert_eq!(scene.resolve(), SceneSource::DepthQuads);
    }

    #[test]
    fn directory_is_not_an_asset() {
        let scene = SceneSource::Model {
            mesh_path: manifest_file("src"),
            texture_path: manifest_file("Cargo.toml"),
        };
        assert_eq!(scene.resolve(), SceneSource::DepthQuads);
    }

    #[test]
    fn quads_stay_quads() {
        assert_eq!(SceneSource::DepthQuads.resolve(), SceneSource::DepthQuads);
    }
}

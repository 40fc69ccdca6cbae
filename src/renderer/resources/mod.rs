//! "Resources" are the GPU objects built on top of the device context:
//! buffers, images, textures, meshes, and shader modules.

pub mod buffer;
pub mod image;
pub mod mesh;
pub mod shader;
pub mod texture;

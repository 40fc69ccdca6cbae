use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;

/// One SPIR-V module holding both the vertex and fragment entry points
pub struct GraphicsShader {
    pub module: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub const VERTEX_ENTRY: &'static CStr = c"vs_main";
    pub const FRAGMENT_ENTRY: &'static CStr = c"fs_main";

    pub fn new(path: &Path, device: Arc<ash::Device>) -> Result<Self> {
        let bytes = std::fs::read(path)
            .wrap_err_with(|| format!("Failed to read shader {}", path.display()))?;
        let module = create_shader_module(&bytes, &device)?;
        log::debug!("Loaded shader module {}", path.display());
        Ok(Self { module, device })
    }

    pub fn stage_infos(&self) -> [vk::PipelineShaderStageCreateInfo<'static>; 2] {
        [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(self.module)
                .name(Self::VERTEX_ENTRY),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(self.module)
                .name(Self::FRAGMENT_ENTRY),
        ]
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

fn create_shader_module(bytes: &[u8], device: &ash::Device) -> Result<vk::ShaderModule> {
    // read_spv copies into u32 words, so the file buffer may have any alignment
    let code = ash::util::read_spv(&mut Cursor::new(bytes))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&code);

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}

use std::ffi::{CStr, CString};
use std::io::Cursor;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

/// A compiled shader module and the entry point the pipeline should call
pub struct Shader {
    pub module: vk::ShaderModule,
    entry_point: CString,
    device: Arc<ash::Device>,
}

impl Shader {
    /// Create a shader module from a SPIR-V binary. The bytes need not be 4-byte aligned.
    pub fn from_spirv(spirv: &[u8], device: Arc<ash::Device>) -> Result<Self> {
        let code = ash::util::read_spv(&mut Cursor::new(spirv))?;

        let shader_module_info = vk::ShaderModuleCreateInfo::default()
            .code(&code);
        let module = unsafe {
            device.create_shader_module(&shader_module_info, None)?
        };

        Ok(Self {
            module,
            entry_point: CString::new("main")?,
            device,
        })
    }

    pub fn with_entry_point(mut self, name: &str) -> Result<Self> {
        self.entry_point = CString::new(name)?;
        Ok(self)
    }

    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

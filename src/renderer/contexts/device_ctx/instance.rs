use std::ffi::{c_char, c_void, CStr, CString};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use raw_window_handle::HasDisplayHandle;
use winit::window::Window;
use crate::renderer::config::RenderConfig;

/// Loads Vulkan and keeps the Vulkan instance alive, along with its debug messenger
pub struct RenderInstance {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl RenderInstance {
    pub fn new(
        window: &Window,
        config: &RenderConfig,
    ) -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };

        let enabled_layers = if config.enable_validation {
            let available_layers = unsafe {
                entry
                    .enumerate_instance_layer_properties()?
                    .iter()
                    .filter_map(|props| props.layer_name_as_c_str().ok())
                    .map(CStr::to_owned)
                    .collect::<Vec<_>>()
            };
            select_validation_layers(
                &available_layers,
                &config.validation_layers,
                config.require_validation_layers,
            )?
        } else {
            Vec::new()
        };
        // Messages are routed to the log only when validation is on
        let enable_debug_utils = config.enable_validation;

        let instance = Self::create_instance(
            &entry,
            window,
            config,
            &enabled_layers,
            enable_debug_utils,
        )?;

        let debug_utils = if enable_debug_utils {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let info = debug_utils_messenger_create_info(config.debug_message_severity);
            let messenger = unsafe {
                loader.create_debug_utils_messenger(&info, None)?
            };
            Some((loader, messenger))
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance with layers {:?}",
            enabled_layers,
        );

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    fn create_instance(
        entry: &ash::Entry,
        window: &Window,
        config: &RenderConfig,
        enabled_layers: &[CString],
        enable_debug_utils: bool,
    ) -> Result<ash::Instance> {
        let application_name = CString::new(config.window_title.as_str())?;
        let application_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let enabled_layer_names = enabled_layers
            .iter()
            .map(|layer| layer.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_extension_names = Self::get_required_instance_extensions(
            window,
            enable_debug_utils,
        )?;

        let mut debug_info = debug_utils_messenger_create_info(config.debug_message_severity);
        let mut instance_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_layer_names(&enabled_layer_names)
            .enabled_extension_names(&enabled_extension_names);
        if enable_debug_utils {
            // Also covers messages from instance creation and destruction
            instance_info = instance_info.push_next(&mut debug_info);
        }

        #[cfg(target_os = "macos")]
        let instance_info = instance_info
            .flags(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR);

        Ok(unsafe {
            entry.create_instance(&instance_info, None)?
        })
    }

    fn get_required_instance_extensions(
        window: &Window,
        enable_debug_utils: bool,
    ) -> Result<Vec<*const c_char>> {
        let mut exts = ash_window::enumerate_required_extensions(
            window.display_handle()?.as_raw()
        )?.to_vec();

        if enable_debug_utils {
            exts.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        #[cfg(target_os = "macos")]
        {
            exts.push(ash::khr::portability_enumeration::NAME.as_ptr());
            exts.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
        }

        Ok(exts)
    }
}

impl Drop for RenderInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Requested layers the loader knows about. Unknown layers are an error when `strict`
/// and are skipped with a warning otherwise.
pub fn select_validation_layers(
    available: &[CString],
    requested: &[CString],
    strict: bool,
) -> Result<Vec<CString>> {
    let mut enabled = Vec::with_capacity(requested.len());
    for layer in requested {
        if available.contains(layer) {
            enabled.push(layer.clone());
        } else if strict {
            return Err(eyre!("Validation layer {:?} not supported", layer));
        } else {
            log::warn!("Validation layer {:?} not available, continuing without it", layer);
        }
    }
    Ok(enabled)
}

fn debug_utils_messenger_create_info(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    let message_type = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(message_severity)
        .message_type(message_type)
        .pfn_user_callback(Some(debug_callback))
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let msg_type = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        _ => "[Unknown]",
    };
    let msg = unsafe {
        if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr((*p_callback_data).p_message).to_string_lossy()
    };
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            log::trace!("{} {}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("{} {}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("{} {}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("{} {}", msg_type, msg);
        }
        _ => {
            log::warn!("{} {}", msg_type, msg);
        }
    }

    // Never abort the call that triggered the message
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(layers: &[&CStr]) -> Vec<CString> {
        layers.iter().map(|l| (*l).to_owned()).collect()
    }

    #[test]
    fn keeps_available_layers() {
        let available = names(&[c"VK_LAYER_KHRONOS_validation", c"VK_LAYER_MESA_overlay"]);
        let requested = names(&[c"VK_LAYER_KHRONOS_validation"]);
        let enabled = select_validation_layers(&available, &requested, true).unwrap();
        assert_eq!(enabled, requested);
    }

    #[test]
    fn missing_layer_is_skipped_when_lenient() {
        let available = names(&[c"VK_LAYER_MESA_overlay"]);
        let requested = names(&[c"VK_LAYER_KHRONOS_validation"]);
        let enabled = select_validation_layers(&available, &requested, false).unwrap();
        assert!(enabled.is_empty());
    }

    #[test]
    fn missing_layer_is_fatal_when_strict() {
        let requested = names(&[c"VK_LAYER_KHRONOS_validation"]);
        assert!(select_validation_layers(&[], &requested, true).is_err());
    }
}

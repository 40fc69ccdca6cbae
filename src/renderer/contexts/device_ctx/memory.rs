use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

/// Index of the first memory type allowed by `type_filter` whose flags contain `required`
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = (properties.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);

    properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            type_filter & (1 << index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(index, _)| index as u32)
        .ok_or_else(|| eyre!(
            "No memory type matches filter {:#b} with properties {:?}",
            type_filter,
            required,
        ))
}

/// Fails early when the device lacks the memory kinds used for staging and resident data
pub fn check_required_memory_types(properties: &vk::PhysicalDeviceMemoryProperties) -> Result<()> {
    let host_visible = find_memory_type(
        properties,
        u32::MAX,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    let device_local = find_memory_type(
        properties,
        u32::MAX,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    log::debug!(
        "Memory types: host-visible coherent at {}, device-local at {}",
        host_visible,
        device_local,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (slot, flags) in properties.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        properties
    }

    #[test]
    fn picks_first_matching_type() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        let index = find_memory_type(
            &properties,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_type_filter() {
        let properties = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let index = find_memory_type(&properties, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn ignores_types_past_the_reported_count() {
        let mut properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        properties.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert!(find_memory_type(&properties, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }

    #[test]
    fn no_match_is_an_error() {
        let properties = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(find_memory_type(&properties, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
        assert!(check_required_memory_types(&properties).is_err());
    }
}

use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;

pub struct Queue {
    pub family_index: u32,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family_index: u32,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family_index,
            handle,
        }
    }
}

/// Queue family indices used for drawing and presenting
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Picks the graphics and presentation families from a device's queue family list.
    /// A single family that can do both is preferred over two separate ones.
    pub fn find<F>(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: F,
    ) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut graphics = None;
        let mut present = None;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if family.queue_count == 0 {
                continue;
            }

            let can_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let can_present = supports_present(index)?;

            if can_graphics && can_present {
                return Ok(Self {
                    graphics: index,
                    present: index,
                });
            }
            if can_graphics && graphics.is_none() {
                graphics = Some(index);
            }
            if can_present && present.is_none() {
                present = Some(index);
            }
        }

        Ok(Self {
            graphics: graphics.ok_or_eyre("No queue family supports graphics")?,
            present: present.ok_or_eyre("No queue family supports presentation to the surface")?,
        })
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, one queue gets created per entry
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

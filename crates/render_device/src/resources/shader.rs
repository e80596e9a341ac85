//! Shader modules

use ash::vk;

use crate::error::{DeviceError, DeviceResult};
use crate::types::ShaderStage;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// A compiled shader stage
#[derive(Debug, Clone, Copy)]
pub(crate) struct Shader {
    pub stage: ShaderStage,
    pub module: vk::ShaderModule,
}

/// Reinterpret a SPIR-V blob as words, copying only when it is misaligned
pub(crate) fn spirv_words(bytes: &[u8]) -> DeviceResult<Vec<u32>> {
    if bytes.len() % 4 != 0 || bytes.is_empty() {
        log::error!("SPIR-V blob has invalid size {}", bytes.len());
        return Err(DeviceError::invalid_operation(format!(
            "SPIR-V size {} is not a non-zero multiple of 4",
            bytes.len()
        )));
    }

    let (prefix, aligned, suffix) = unsafe { bytes.align_to::<u32>() };
    let words = if prefix.is_empty() && suffix.is_empty() {
        aligned.to_vec()
    } else {
        bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    };

    if words[0] != SPIRV_MAGIC {
        log::error!("SPIR-V magic mismatch: {:#010x}", words[0]);
        return Err(DeviceError::invalid_operation("blob is not SPIR-V"));
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_spirv() {
        assert!(spirv_words(&[1, 2, 3]).is_err());
        assert!(spirv_words(&[0, 0, 0, 0]).is_err());
        assert!(spirv_words(&[]).is_err());
    }

    #[test]
    fn test_accepts_magic_in_any_alignment() {
        let mut blob = vec![0u8];
        blob.extend_from_slice(&SPIRV_MAGIC.to_le_bytes());
        blob.extend_from_slice(&0x0001_0000u32.to_le_bytes());

        // force a misaligned view by skipping the pad byte
        let words = spirv_words(&blob[1..]).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }
}

/// Functional tests running policy, overwrite and verification together
///
/// Each test writes a real temporary file, runs every pass the policy asks
/// for and reads the result back.

#[cfg(test)]
mod functional_wipe_tests {
    use crate::algorithms::{BytePattern, OverwriteExecutor, PatternPolicy};
    use crate::io::FileDeviceAccess;
    use crate::verification::WipeVerifier;
    use crate::{DeviceClass, WipeMethod};
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn random_target(dir: &TempDir, len: usize) -> PathBuf {
        let mut data = vec![0u8; len];
        StdRng::seed_from_u64(42).fill_bytes(&mut data);
        let path = dir.path().join("target.img");
        std::fs::write(&path, data).unwrap();
        path
    }

    fn run_policy(method: WipeMethod, class: DeviceClass, len: usize) -> (Vec<BytePattern>, Vec<u8>) {
        let dir = TempDir::new().unwrap();
        let target = random_target(&dir, len);
        let access = FileDeviceAccess::new();
        let plan = PatternPolicy::plan(method, class);
        let mut rng = StdRng::seed_from_u64(9);

        let report = OverwriteExecutor::new(&access)
            .overwrite(
                &target,
                |pass| plan[pass as usize].resolve(&mut rng),
                plan.len() as u32,
                4096,
            )
            .unwrap();

        let verifier = WipeVerifier::new(&access);
        let expected = report.final_pattern().unwrap();
        assert!(verifier.verify(&target, expected, report.extent_size).unwrap());
        assert_eq!(report.bytes_written, len as u64 * plan.len() as u64);

        (report.pass_patterns, std::fs::read(&target).unwrap())
    }

    #[test]
    fn test_clear_leaves_zeros_on_every_class() {
        for class in DeviceClass::ALL {
            let (patterns, content) = run_policy(WipeMethod::Clear, class, 10_000);
            assert_eq!(patterns, vec![BytePattern::byte(0)]);
            assert!(content.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_purge_sequence_on_sd_card() {
        let (patterns, content) = run_policy(WipeMethod::Purge, DeviceClass::SDCard, 4096);
        let observed: Vec<u8> = patterns.iter().map(|p| p.as_bytes()[0]).collect();
        assert_eq!(observed, vec![0x00, 0xFF, 0x00]);
        assert!(content.iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_purge_ssd_leaves_uniform_random_byte() {
        let (patterns, content) = run_policy(WipeMethod::Purge, DeviceClass::SSD, 65_536);
        assert_eq!(patterns.len(), 1);
        let byte = patterns[0].as_bytes()[0];
        assert!(content.iter().all(|&b| b == byte));
    }

    #[test]
    fn test_extent_not_multiple_of_block_size() {
        let (_, content) = run_policy(WipeMethod::Purge, DeviceClass::HDD, 4096 * 3 + 17);
        assert_eq!(content.len(), 4096 * 3 + 17);
        assert!(content.iter().all(|&b| b == 0x00));
    }
}

use std::collections::HashMap;

use crate::config::FusionOptions;

/// 将基础相似度排序与人脸身份信号融合
///
/// `face_sims` 是每个 media_key 在全部查询人脸与候选人脸组合上的最大
/// 相似度。候选集合取基础排序与人脸命中的并集，逐条按阈值分档：
///
/// - 无人脸命中或低于软阈值：保持基础分，弱信号不参与排序
/// - 软阈值到强阈值之间：0.8 * 基础分 + 0.2 * 人脸分，轻微上推
/// - 达到强阈值：blend * 人脸分 + (1 - blend) * 基础分，人脸主导
///
/// 边缘的人脸匹配不允许压过强基础匹配，确信的同人匹配才应该主导。
/// 结果按分数降序、同分按 key 升序，截断到 top_k。
pub fn fuse(
    base: &[(String, f32)],
    face_sims: &HashMap<String, f32>,
    opts: &FusionOptions,
    top_k: usize,
) -> Vec<(String, f32)> {
    let base_map: HashMap<&str, f32> =
        base.iter().map(|(key, score)| (key.as_str(), *score)).collect();

    let mut keys: Vec<&str> = base_map.keys().copied().collect();
    for key in face_sims.keys() {
        if !base_map.contains_key(key.as_str()) {
            keys.push(key.as_str());
        }
    }

    let mut fused: Vec<(String, f32)> = keys
        .into_iter()
        .map(|key| {
            let base_score = base_map.get(key).copied().unwrap_or(0.0);
            let score = match face_sims.get(key) {
                Some(&fs) if fs >= opts.face_sim_strong => {
                    opts.face_blend * fs + (1.0 - opts.face_blend) * base_score
                }
                Some(&fs) if fs >= opts.face_sim_soft => 0.8 * base_score + 0.2 * fs,
                _ => base_score,
            };
            (key.to_string(), score)
        })
        .collect();

    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    fused.truncate(top_k);
    fused
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn base() -> Vec<(String, f32)> {
        vec![
            ("m1".to_string(), 0.9),
            ("m2".to_string(), 0.5),
            ("m3".to_string(), 0.1),
        ]
    }

    fn opts() -> FusionOptions {
        FusionOptions { face_sim_soft: 0.4, face_sim_strong: 0.6, face_blend: 0.85 }
    }

    #[test]
    fn no_face_hits_passes_base_through() {
        let fused = fuse(&base(), &HashMap::new(), &opts(), 3);
        assert_eq!(fused, base());
    }

    #[rstest]
    #[case::below_soft(0.39, 0.5)]
    #[case::soft_tier(0.5, 0.8 * 0.5 + 0.2 * 0.5)]
    #[case::at_strong(0.6, 0.85 * 0.6 + 0.15 * 0.5)]
    #[case::strong_tier(0.95, 0.85 * 0.95 + 0.15 * 0.5)]
    fn tier_blending(#[case] face_sim: f32, #[case] expected: f32) {
        let sims = HashMap::from([("m2".to_string(), face_sim)]);
        let fused = fuse(&base(), &sims, &opts(), 3);
        let m2 = fused.iter().find(|(k, _)| k == "m2").unwrap();
        assert!((m2.1 - expected).abs() < 1e-6);
    }

    #[test]
    fn strong_face_match_does_not_override_stronger_base() {
        // 查询人脸与 m2 的人脸相似度 0.95，高于强阈值
        let sims = HashMap::from([("m2".to_string(), 0.95f32)]);
        let fused = fuse(&base(), &sims, &opts(), 3);

        let m2 = fused.iter().find(|(k, _)| k == "m2").unwrap();
        assert!((m2.1 - (0.85 * 0.95 + 0.15 * 0.5)).abs() < 1e-6);
        assert!((m2.1 - 0.8825).abs() < 1e-4);

        // m1 的基础分 0.9 仍然排在前面
        let keys: Vec<&str> = fused.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["m1", "m2", "m3"]);
    }

    #[test]
    fn face_only_candidate_joins_ranking() {
        let sims = HashMap::from([("m9".to_string(), 0.9f32)]);
        let fused = fuse(&base(), &sims, &opts(), 4);
        let m9 = fused.iter().find(|(k, _)| k == "m9").unwrap();
        // 基础分为 0，完全由人脸信号决定
        assert!((m9.1 - 0.85 * 0.9).abs() < 1e-6);
    }

    #[test]
    fn monotone_in_face_similarity_above_soft() {
        let opts = opts();
        let mut last = f32::MIN;
        for i in 0..=60 {
            let fs = 0.4 + i as f32 * 0.01;
            let sims = HashMap::from([("m2".to_string(), fs)]);
            let fused = fuse(&base(), &sims, &opts, 3);
            let score = fused.iter().find(|(k, _)| k == "m2").unwrap().1;
            assert!(score >= last - 1e-6, "fs={fs} score={score} last={last}");
            last = score;
        }
    }

    #[test]
    fn truncates_and_breaks_ties_by_key() {
        let base = vec![("b".to_string(), 0.5), ("a".to_string(), 0.5), ("c".to_string(), 0.4)];
        let fused = fuse(&base, &HashMap::new(), &opts(), 2);
        let keys: Vec<&str> = fused.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
    }
}

use bytemuck::cast_slice;
use byteorder::{ByteOrder, LittleEndian};

/// 将 float32 向量编码为小端字节序列
pub fn floats_to_bytes(values: &[f32]) -> Vec<u8> {
    cast_slice(values).to_vec()
}

/// 将字节序列解码为 float32 向量，多余的尾部字节会被丢弃
pub fn bytes_to_floats(data: &[u8]) -> Vec<f32> {
    let count = data.len() / 4;
    let mut out = vec![0f32; count];
    LittleEndian::read_f32_into(&data[..count * 4], &mut out);
    out
}

/// 带校验的解码：长度必须是 4 的倍数且维数等于 `dim`，否则返回 None
pub fn decode_checked(data: &[u8], dim: usize) -> Option<Vec<f32>> {
    if data.is_empty() || data.len() % 4 != 0 || data.len() / 4 != dim {
        return None;
    }
    Some(bytes_to_floats(data))
}

/// 原地 L2 归一化，零向量保持不变
pub fn l2_normalize(vector: &mut [f32]) {
    let ss = vector.iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>();
    let norm = ss.sqrt().max(1e-12);
    for v in vector.iter_mut() {
        *v = (*v as f64 / norm) as f32;
    }
}

/// 点积，等价于归一化向量的余弦相似度
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let v = vec![0.25f32, -1.5, 3.75, f32::MIN_POSITIVE];
        let bytes = floats_to_bytes(&v);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_floats(&bytes), v);
    }

    #[test]
    fn roundtrip_empty() {
        let bytes = floats_to_bytes(&[]);
        assert!(bytes.is_empty());
        assert!(bytes_to_floats(&bytes).is_empty());
    }

    #[test]
    fn decode_rejects_bad_length() {
        assert!(decode_checked(&[0u8; 7], 2).is_none());
        assert!(decode_checked(&[0u8; 8], 3).is_none());
        assert!(decode_checked(&[], 0).is_none());
        assert!(decode_checked(&[0u8; 8], 2).is_some());
    }

    #[test]
    fn normalize_unit_length() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0f32; 4];
        l2_normalize(&mut zero);
        assert!(zero.iter().all(|x| *x == 0.0));
    }
}

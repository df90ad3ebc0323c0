/// In-place L2 normalization; a zero vector is left untouched.
pub(crate) fn l2_normalize_in_place(v: &mut [f32]) {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[test]
    fn scales_to_unit_length() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize_in_place(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn flattened_hidden_state_becomes_unit_vector() {
        // 77 x 8 hidden state, as the pipeline hands it over
        let mut v: Vec<f32> = (0..77 * 8).map(|i| (i % 13) as f32 - 6.0).collect();
        l2_normalize_in_place(&mut v);
        assert!((norm(&v) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_vector_is_unchanged() {
        let mut v = vec![0.0f32; 4];
        l2_normalize_in_place(&mut v);
        assert_eq!(v, vec![0.0; 4]);
    }

    #[test]
    fn empty_slice_is_fine() {
        let mut v: Vec<f32> = Vec::new();
        l2_normalize_in_place(&mut v);
        assert!(v.is_empty());
    }
}

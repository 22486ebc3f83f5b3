pub struct Math {}
impl Math {
    pub fn round_float_to_n_decimals(number: f64, decimals: i32) -> f64 {
        let multiplier = 10.0_f64.powi(decimals);
        (number * multiplier).round() / multiplier
    }

    pub fn mean(nums: &[f64]) -> f64 {
        let sum: f64 = nums.iter().sum();
        let len = nums.len() as f64;
        sum / len
    }

    pub fn standard_deviation(nums: &[f64]) -> f64 {
        let mean = Math::mean(nums);
        let mut sum = 0.0;
        for num in nums {
            sum += (num - mean).powi(2);
        }

        (sum / nums.len() as f64).sqrt()
    }

    /// standard deviation relative to the mean. a rest break in the lap
    /// window shows up here long before it moves the mean.
    pub fn coefficient_of_variation(nums: &[f64]) -> f64 {
        let mean = Math::mean(nums);
        if mean == 0.0 {
            return 0.0;
        }

        Math::standard_deviation(nums) / mean
    }

    /// average of `nums` where `weights[i]` scales `nums[i]`.
    /// weights are renormalized so they do not need to sum to one.
    pub fn weighted_mean(nums: &[f64], weights: &[f64]) -> f64 {
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (num, weight) in nums.iter().zip(weights.iter()) {
            weighted_sum += num * weight;
            weight_total += weight;
        }

        if weight_total == 0.0 {
            return 0.0;
        }

        weighted_sum / weight_total
    }
}

#[cfg(test)]
mod tests {
    use super::Math;

    #[test]
    fn mean_of_uniform_values() {
        assert_eq!(Math::mean(&[600.0, 600.0, 600.0]), 600.0);
    }

    #[test]
    fn standard_deviation_of_identical_values_is_zero() {
        assert_eq!(Math::standard_deviation(&[12.0, 12.0, 12.0, 12.0]), 0.0);
    }

    #[test]
    fn coefficient_of_variation_scales_with_spread() {
        let tight = Math::coefficient_of_variation(&[600.0, 605.0, 595.0]);
        let wide = Math::coefficient_of_variation(&[600.0, 900.0, 300.0]);
        assert!(tight < wide);
    }

    #[test]
    fn weighted_mean_prefers_heavier_values() {
        let mean = Math::weighted_mean(&[100.0, 200.0], &[1.0, 3.0]);
        assert_eq!(mean, 175.0);
    }

    #[test]
    fn weighted_mean_with_zero_weights() {
        assert_eq!(Math::weighted_mean(&[100.0], &[0.0]), 0.0);
    }

    #[test]
    fn rounding() {
        assert_eq!(Math::round_float_to_n_decimals(480.12345, 2), 480.12);
    }
}

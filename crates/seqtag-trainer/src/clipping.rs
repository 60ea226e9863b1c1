use anyhow::Result;
use candle_core::backprop::GradStore;
use candle_core::{DType, Var};

const EPS: f64 = 1e-6;

/// Scale the gradients of `vars` in place so their global L2 norm is at most
/// `max_norm`. Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> Result<f64> {
    let mut total_sq = 0f64;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            let sq = grad
                .to_dtype(DType::F32)?
                .sqr()?
                .sum_all()?
                .to_scalar::<f32>()?;
            total_sq += sq as f64;
        }
    }
    let total_norm = total_sq.sqrt();

    let clip_coef = max_norm / (total_norm + EPS);
    if clip_coef < 1.0 {
        for var in vars {
            let tensor = var.as_tensor();
            if let Some(grad) = grads.get(tensor) {
                let scaled = grad.affine(clip_coef, 0.0)?;
                grads.insert(tensor, scaled);
            }
        }
    }

    Ok(total_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Tensor};

    fn norm_of(grads: &GradStore, var: &Var) -> f32 {
        grads
            .get(var.as_tensor())
            .unwrap()
            .sqr()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap()
            .sqrt()
    }

    #[test]
    fn test_large_gradient_is_clipped() {
        let var = Var::from_tensor(&Tensor::new(&[30f32, 40.], &Device::Cpu).unwrap()).unwrap();
        // d/dx sum(x^2) = 2x = [60, 80], norm 100
        let loss = var.as_tensor().sqr().unwrap().sum_all().unwrap();
        let mut grads = loss.backward().unwrap();

        let before = clip_grad_norm(&mut grads, &[var.clone()], 5.0).unwrap();
        assert!((before - 100.0).abs() < 1e-3);

        let clipped = grads.get(var.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        assert!((clipped[0] - 3.0).abs() < 1e-3);
        assert!((clipped[1] - 4.0).abs() < 1e-3);
        assert!(norm_of(&grads, &var) <= 5.0 + 1e-4);
    }

    #[test]
    fn test_small_gradient_is_untouched() {
        let var = Var::from_tensor(&Tensor::new(&[0.3f32, 0.4], &Device::Cpu).unwrap()).unwrap();
        let loss = var.as_tensor().sqr().unwrap().sum_all().unwrap();
        let mut grads = loss.backward().unwrap();

        clip_grad_norm(&mut grads, &[var.clone()], 5.0).unwrap();
        let grad = grads.get(var.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        assert!((grad[0] - 0.6).abs() < 1e-6);
        assert!((grad[1] - 0.8).abs() < 1e-6);
    }
}

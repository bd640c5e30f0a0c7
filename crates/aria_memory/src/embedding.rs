use anyhow::Result;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
use std::sync::Arc;

pub type Embedding = Vec<f32>;

/// Text-to-vector seam. The knowledge store only needs a fixed dimension and
/// a way to embed one string; tests substitute a deterministic implementation.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Production embedder backed by fastembed.
#[derive(Clone)]
pub struct TextEmbedder {
    model: Arc<TextEmbedding>,
    dimension: usize,
}

impl TextEmbedder {
    pub fn new() -> Result<Self> {
        // MultilingualE5Small handles mixed-language utterances well and keeps
        // the vector dimension small (384).
        let mut options = InitOptions::default();
        options.model_name = FastEmbedModel::MultilingualE5Small;
        options.show_download_progress = true;

        let model = TextEmbedding::try_new(options)?;

        Ok(Self {
            model: Arc::new(model),
            dimension: 384,
        })
    }
}

impl Embedder for TextEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        let embeddings = self.model.embed(vec![text], None)?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Failed to generate embedding"))
    }
}

/// L2-normalize in place. A zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Inner product. Over normalized vectors this equals cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_dot_mismatched_lengths() {
        assert_eq!(dot(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_dot_of_normalized_vectors() {
        let mut a = vec![1.0, 1.0];
        let mut b = vec![1.0, 0.0];
        l2_normalize(&mut a);
        l2_normalize(&mut b);
        let sim = dot(&a, &b);
        assert!((sim - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }
}

use nopp_core::{AnalysisConfig, ColorImage, Detection, Method, NoppResult};

/// A pilling detection method. Implementations are stateless and can be
/// shared between threads; all tunables come from the config.
pub trait PillDetector: Send + Sync {
    /// Which method this detector implements
    fn method(&self) -> Method;

    /// Run the method on an 8-bit RGB image
    fn detect(&self, image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection>;
}

impl<T: PillDetector + ?Sized> PillDetector for Box<T> {
    fn method(&self) -> Method {
        (**self).method()
    }

    fn detect(&self, image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
        (**self).detect(image, config)
    }
}

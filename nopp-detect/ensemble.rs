use nopp_core::{
    AnalysisConfig, ColorImage, Detection, FeatureMap, Mask, MemberVotes, Method, NoppError, NoppResult,
    VoteSummary,
};
use tracing::debug;

use crate::detector::PillDetector;
use crate::fourier::FourierDetector;
use crate::lbp_variance::LbpVarianceDetector;
use crate::region::compute_stats;
use crate::watershed::MorphologicalDetector;

/// Votes needed for a strict majority of `members`
pub fn vote_threshold(members: usize) -> usize {
    members / 2 + 1
}

/// Pixels set in at least `members / 2 + 1` of the masks
pub fn majority_vote(masks: &[Mask]) -> NoppResult<(Mask, usize)> {
    if masks.len() < 2 {
        return Err(NoppError::invalid_input(format!(
            "majority vote needs at least 2 masks, got {}",
            masks.len()
        )));
    }
    let first = &masks[0];
    if masks.iter().any(|m| !m.same_shape(first)) {
        return Err(NoppError::invalid_input("ensemble masks differ in shape"));
    }

    let threshold = vote_threshold(masks.len());
    let mut votes = vec![0usize; first.len()];
    for mask in masks {
        for (v, &m) in votes.iter_mut().zip(&mask.data) {
            *v += (m != 0) as usize;
        }
    }
    let data = votes.iter().map(|&v| (v >= threshold) as u8).collect();
    Ok((Mask { width: first.width, height: first.height, data }, threshold))
}

/// Element-wise mean of equally sized feature maps
pub fn mean_feature_map(maps: &[FeatureMap]) -> NoppResult<FeatureMap> {
    let first = maps.first().ok_or_else(|| NoppError::invalid_input("no feature maps to average"))?;
    if maps.iter().any(|m| m.width != first.width || m.height != first.height) {
        return Err(NoppError::invalid_input("ensemble feature maps differ in shape"));
    }
    let n = maps.len() as f64;
    let mut data = vec![0.0f64; first.len()];
    for map in maps {
        for (acc, &v) in data.iter_mut().zip(&map.data) {
            *acc += v;
        }
    }
    data.iter_mut().for_each(|v| *v /= n);
    Ok(FeatureMap { width: first.width, height: first.height, data })
}

/// Pixel detector for one of the methods this crate implements
pub fn pixel_detector(method: Method) -> NoppResult<Box<dyn PillDetector>> {
    match method {
        Method::LbpVariance => Ok(Box::new(LbpVarianceDetector)),
        Method::Fourier => Ok(Box::new(FourierDetector)),
        Method::Morphological => Ok(Box::new(MorphologicalDetector)),
        #[cfg(feature = "wavelet")]
        Method::Wavelet => Ok(Box::new(crate::wavelet::WaveletDetector)),
        #[cfg(not(feature = "wavelet"))]
        Method::Wavelet => Err(NoppError::MissingCapability(nopp_core::Capability::Wavelet)),
        Method::Combined | Method::Dpca => Err(NoppError::invalid_input(format!(
            "{} is not a pixel-level detector",
            method.name()
        ))),
    }
}

/// Default ensemble membership for this build
pub fn default_members() -> Vec<Method> {
    let mut members = vec![Method::LbpVariance, Method::Fourier, Method::Morphological];
    if crate::wavelet_available() {
        members.push(Method::Wavelet);
    }
    members
}

/// Strict majority vote over the masks of its members
pub struct EnsembleDetector {
    members: Vec<Box<dyn PillDetector>>,
}

impl EnsembleDetector {
    pub fn new(members: Vec<Box<dyn PillDetector>>) -> NoppResult<Self> {
        if members.len() < 2 {
            return Err(NoppError::invalid_input(format!(
                "an ensemble needs at least 2 members, got {}",
                members.len()
            )));
        }
        Ok(Self { members })
    }

    /// Ensemble of pixel detectors
    pub fn from_methods(methods: &[Method]) -> NoppResult<Self> {
        let members = methods.iter().map(|&m| pixel_detector(m)).collect::<NoppResult<Vec<_>>>()?;
        Self::new(members)
    }

    /// Members from `config.ensemble_members`, or the default set
    pub fn for_config(config: &AnalysisConfig) -> NoppResult<Self> {
        match &config.ensemble_members {
            Some(methods) => Self::from_methods(methods),
            None => Self::from_methods(&default_members()),
        }
    }

    pub fn methods(&self) -> Vec<Method> {
        self.members.iter().map(|m| m.method()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl std::fmt::Debug for EnsembleDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleDetector").field("members", &self.methods()).finish()
    }
}

impl PillDetector for EnsembleDetector {
    fn method(&self) -> Method {
        Method::Combined
    }

    fn detect(&self, image: &ColorImage, config: &AnalysisConfig) -> NoppResult<Detection> {
        let mut masks = Vec::with_capacity(self.members.len());
        let mut maps = Vec::with_capacity(self.members.len());
        let mut members = Vec::with_capacity(self.members.len());
        for detector in &self.members {
            let detection = detector.detect(image, config)?;
            members.push(MemberVotes { method: detector.method(), pixels: detection.mask.count() });
            masks.push(detection.mask);
            maps.push(detection.feature_map);
        }

        let (mask, threshold) = majority_vote(&masks)?;
        let feature_map = mean_feature_map(&maps)?;
        let mut stats = compute_stats(&mask, &feature_map)?;
        stats.votes = Some(VoteSummary { members, vote_threshold: threshold, member_count: masks.len() });

        debug!(members = masks.len(), threshold, pills = stats.num_pills, "ensemble detection");
        Ok(Detection { mask, feature_map, stats })
    }
}

use image::GrayImage;
use nopp_core::{validate_image, ChannelWeights, ColorImage, FeatureMap, LbpParams, NoppError, NoppResult};
use rayon::prelude::*;

/// Smallest region of interest accepted by `crop_roi`
pub const MIN_ROI_SIZE: u32 = 50;

/// Tolerance of the neighbour >= centre comparison against interpolation round-off
const LBP_EPS: f64 = 1e-9;

/// Grayscale and per-channel texture maps of one image
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub gray: GrayImage,
    /// Uniform LBP codes of the red, green and blue channel
    pub lbp: [FeatureMap; 3],
}

/// Texture preprocessing (luma conversion, local binary patterns)
pub struct TexturePreprocessor;

impl TexturePreprocessor {
    /// Luma with the fixed 0.299 / 0.587 / 0.114 weighting
    pub fn to_gray(image: &ColorImage) -> GrayImage {
        let (w, h) = image.dimensions();
        let mut gray = GrayImage::new(w, h);
        for (dst, src) in gray.pixels_mut().zip(image.pixels()) {
            let [r, g, b] = src.0;
            let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            dst.0[0] = luma.round().clamp(0.0, 255.0) as u8;
        }
        gray
    }

    /// Gray image as a feature map of raw intensities
    pub fn gray_map(gray: &GrayImage) -> FeatureMap {
        let (w, h) = gray.dimensions();
        FeatureMap {
            width: w as usize,
            height: h as usize,
            data: gray.as_raw().iter().map(|&v| v as f64).collect(),
        }
    }

    /// One colour channel (0 = red) as a feature map
    pub fn channel_map(image: &ColorImage, channel: usize) -> FeatureMap {
        let (w, h) = image.dimensions();
        FeatureMap {
            width: w as usize,
            height: h as usize,
            data: image.pixels().map(|p| p.0[channel] as f64).collect(),
        }
    }

    /// Uniform rotation-invariant LBP codes, `points + 2` distinct labels
    pub fn uniform_lbp(channel: &FeatureMap, params: LbpParams) -> NoppResult<FeatureMap> {
        let p = params.points;
        if p == 0 || !params.radius.is_finite() || params.radius <= 0.0 {
            return Err(NoppError::invalid_input(format!(
                "LBP geometry radius={} points={} is invalid",
                params.radius, p
            )));
        }
        let offsets: Vec<(f64, f64)> = (0..p)
            .map(|i| {
                let angle = 2.0 * std::f64::consts::PI * i as f64 / p as f64;
                let dr = round5(-params.radius * angle.sin());
                let dc = round5(params.radius * angle.cos());
                (dr, dc)
            })
            .collect();

        let (w, h) = (channel.width, channel.height);
        let data: Vec<f64> = (0..h)
            .into_par_iter()
            .flat_map_iter(|r| {
                let offsets = &offsets;
                (0..w).map(move |c| {
                    let center = channel.get(c, r);
                    let mut bits = Vec::with_capacity(p);
                    for &(dr, dc) in offsets.iter() {
                        let v = sample_constant(channel, r as f64 + dr, c as f64 + dc);
                        bits.push(v - center >= -LBP_EPS);
                    }
                    uniform_code(&bits) as f64
                })
            })
            .collect();

        Ok(FeatureMap { width: w, height: h, data })
    }

    /// Gray image plus one LBP map per colour channel
    pub fn preprocess(image: &ColorImage, params: LbpParams) -> NoppResult<Preprocessed> {
        validate_image(image)?;
        let gray = Self::to_gray(image);
        let lbp = [
            Self::uniform_lbp(&Self::channel_map(image, 0), params)?,
            Self::uniform_lbp(&Self::channel_map(image, 1), params)?,
            Self::uniform_lbp(&Self::channel_map(image, 2), params)?,
        ];
        Ok(Preprocessed { gray, lbp })
    }
}

fn round5(v: f64) -> f64 {
    (v * 1e5).round() / 1e5
}

/// Bilinear sample where every corner outside the image reads 0
fn sample_constant(map: &FeatureMap, r: f64, c: f64) -> f64 {
    let minr = r.floor();
    let minc = c.floor();
    let maxr = r.ceil();
    let maxc = c.ceil();
    let dr = r - minr;
    let dc = c - minc;

    let pixel = |rr: f64, cc: f64| -> f64 {
        if rr < 0.0 || cc < 0.0 || rr >= map.height as f64 || cc >= map.width as f64 {
            0.0
        } else {
            map.get(cc as usize, rr as usize)
        }
    };

    let top = (1.0 - dc) * pixel(minr, minc) + dc * pixel(minr, maxc);
    let bottom = (1.0 - dc) * pixel(maxr, minc) + dc * pixel(maxr, maxc);
    (1.0 - dr) * top + dr * bottom
}

/// Set-bit count when the pattern has at most two 0/1 transitions, else `P + 1`
fn uniform_code(bits: &[bool]) -> usize {
    let changes = bits.windows(2).filter(|w| w[0] != w[1]).count();
    if changes <= 2 {
        bits.iter().filter(|&&b| b).count()
    } else {
        bits.len() + 1
    }
}

/// Mean colour of the image as (red, green, blue)
pub fn average_color(image: &ColorImage) -> NoppResult<[f64; 3]> {
    validate_image(image)?;
    let mut sum = [0.0f64; 3];
    for p in image.pixels() {
        for c in 0..3 {
            sum[c] += p.0[c] as f64;
        }
    }
    let n = (image.width() as f64) * (image.height() as f64);
    Ok([sum[0] / n, sum[1] / n, sum[2] / n])
}

/// Channel weights emphasising channels that contrast with the garment colour.
/// Dark garments (channel sum below 400) weight each channel by `255 - c`,
/// light garments by `max - c + 50`.
pub fn suggest_channel_weights(avg: [f64; 3]) -> ChannelWeights {
    let total: f64 = avg.iter().sum();
    let raw = if total < 400.0 {
        [255.0 - avg[0], 255.0 - avg[1], 255.0 - avg[2]]
    } else {
        let max = avg.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        [max - avg[0] + 50.0, max - avg[1] + 50.0, max - avg[2] + 50.0]
    };
    let sum: f64 = raw.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return ChannelWeights::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
    }
    ChannelWeights::new(raw[0] / sum, raw[1] / sum, raw[2] / sum)
}

/// Crop to the rectangle spanned by two corners, clamped to the image.
/// Both sides of the result must be at least `MIN_ROI_SIZE` pixels.
pub fn crop_roi(image: &ColorImage, x1: u32, y1: u32, x2: u32, y2: u32) -> NoppResult<ColorImage> {
    let (w, h) = image.dimensions();
    let (x1, x2) = (x1.min(x2).min(w), x1.max(x2).min(w));
    let (y1, y2) = (y1.min(y2).min(h), y1.max(y2).min(h));
    if x2 - x1 < MIN_ROI_SIZE || y2 - y1 < MIN_ROI_SIZE {
        return Err(NoppError::invalid_input(format!(
            "region ({}, {})-({}, {}) is smaller than {}x{}",
            x1, y1, x2, y2, MIN_ROI_SIZE, MIN_ROI_SIZE
        )));
    }
    Ok(image::imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image())
}

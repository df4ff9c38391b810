use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::models::Rect;
use crate::pipeline::detect::{Detections, Detector, DetectorConfig};

const MODEL_FILE: &str = "scrfd_500m_bnkps.onnx";
const MODEL_URL_HF: &str = "https://huggingface.co/ykk648/face_lib/resolve/main/face_detect/scrfd_onnx/scrfd_500m_bnkps.onnx";
const MODEL_URL_GH: &str = "https://github.com/deepinsight/insightface/releases/download/v0.7/scrfd_500m_bnkps.onnx";
const STRIDES: [u32; 3] = [8, 16, 32];

/// Face detector running the SCRFD ONNX model.
pub struct ScrfdDetector {
    session: Mutex<Session>,
    output_names: Vec<String>,
    config: DetectorConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn width(&self) -> f32 { self.x2 - self.x1 }
    fn height(&self) -> f32 { self.y2 - self.y1 }
}

impl ScrfdDetector {
    /// Loads the model from `models_dir`, downloading it first when missing and allowed.
    pub async fn load(models_dir: &Path, config: DetectorConfig, auto_download: bool) -> Result<Self> {
        std::fs::create_dir_all(models_dir).context("Failed to create models directory")?;
        let model_path = models_dir.join(MODEL_FILE);
        if !model_path.exists() {
            if !auto_download {
                anyhow::bail!("Face model missing at {:?} and auto-download is disabled", model_path);
            }
            download_model(&model_path).await?;
        }

        let session = Session::builder()?
            .commit_from_file(&model_path)
            .context("Failed to create SCRFD session")?;
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        info!("Face model loaded: {:?} (outputs: {:?})", model_path, output_names);

        Ok(Self {
            session: Mutex::new(session),
            output_names,
            config: config.normalized(),
        })
    }

    /// Letterboxes into the square input (NCHW, BGR, normalized to [-1, 1]).
    fn preprocess(&self, image: &DynamicImage) -> ([i64; 4], Vec<f32>, f32) {
        let size = self.config.input_size;
        let (ow, oh) = (image.width() as f32, image.height() as f32);
        let scale = size as f32 / ow.max(oh);
        let nw = ((ow * scale) as u32).clamp(1, size);
        let nh = ((oh * scale) as u32).clamp(1, size);
        let resized = image.resize_exact(nw, nh, image::imageops::FilterType::Triangle);
        let mut padded = DynamicImage::new_rgb8(size, size);
        image::imageops::overlay(&mut padded, &resized, 0, 0);
        let rgb = padded.to_rgb8();

        let n = size as usize;
        let mut data = Vec::with_capacity(3 * n * n);
        // model expects BGR channel order
        for c in [2usize, 1, 0] {
            for y in 0..size {
                for x in 0..size {
                    let v = rgb.get_pixel(x, y)[c] as f32;
                    data.push((v - 127.5) / 128.0);
                }
            }
        }
        ([1, 3, size as i64, size as i64], data, scale)
    }

    /// Output tensor names for a stride: named outputs first, then positional
    /// (scores for all strides, then boxes, as exported by insightface).
    fn output_pair(&self, nth: usize, stride: u32) -> Option<(String, String)> {
        let score = format!("score_{stride}");
        let bbox = format!("bbox_{stride}");
        if self.output_names.contains(&score) && self.output_names.contains(&bbox) {
            return Some((score, bbox));
        }
        let fmc = STRIDES.len();
        if self.output_names.len() >= 2 * fmc {
            return Some((self.output_names[nth].clone(), self.output_names[nth + fmc].clone()));
        }
        None
    }

    fn run(&self, image: &DynamicImage) -> Result<Vec<Candidate>> {
        let (shape, data, scale) = self.preprocess(image);
        let (img_w, img_h) = (image.width() as f32, image.height() as f32);

        let mut session = self.session.lock();
        let input_name = session.inputs[0].name.clone();
        let input = Value::from_array((shape.to_vec(), data))
            .context("Failed to create SCRFD input tensor")?;
        let outputs = session
            .run(ort::inputs![input_name => input])
            .context("SCRFD inference failed")?;

        let mut raw = Vec::new();
        for (nth, stride) in STRIDES.into_iter().enumerate() {
            let Some((score_name, bbox_name)) = self.output_pair(nth, stride) else {
                warn!("SCRFD: no outputs for stride {}", stride);
                continue;
            };
            let (Some(sv), Some(bv)) = (outputs.get(&score_name), outputs.get(&bbox_name)) else {
                continue;
            };
            let (Ok((_, scores)), Ok((_, boxes))) =
                (sv.try_extract_tensor::<f32>(), bv.try_extract_tensor::<f32>())
            else {
                warn!("SCRFD: stride {} outputs are not f32 tensors", stride);
                continue;
            };
            let decoded = decode_stride(scores, boxes, stride, self.config.input_size, self.config.confidence);
            debug!("SCRFD stride {}: {} candidates over threshold", stride, decoded.len());
            raw.extend(decoded.into_iter().map(|c| Candidate {
                x1: (c.x1 / scale).clamp(0.0, img_w),
                y1: (c.y1 / scale).clamp(0.0, img_h),
                x2: (c.x2 / scale).clamp(0.0, img_w),
                y2: (c.y2 / scale).clamp(0.0, img_h),
                score: c.score,
            }));
        }
        Ok(raw)
    }
}

impl Detector for ScrfdDetector {
    fn detect<'a>(&'a self, image: &'a DynamicImage) -> crate::error::Result<Detections<'a>> {
        let raw = self
            .run(image)
            .map_err(|e| PipelineError::Detection(format!("{e:#}")))?;
        let min = self.config.min_face_size as f32;
        let sized: Vec<Candidate> = raw
            .into_iter()
            .filter(|c| c.width() >= min && c.height() >= min)
            .collect();
        let faces = suppress(&sized, self.config.nms_iou, self.config.min_neighbors);
        info!("Face detection: {}x{} image, {} faces", image.width(), image.height(), faces.len());
        Ok(Box::new(
            faces
                .into_iter()
                .filter_map(|c| Rect::from_corners(c.x1, c.y1, c.x2, c.y2)),
        ))
    }
}

/// Decodes one stride's anchor grid into boxes in input-image coordinates.
fn decode_stride(scores: &[f32], boxes: &[f32], stride: u32, input_size: u32, threshold: f32) -> Vec<Candidate> {
    let side = (input_size / stride) as usize;
    let grid = side * side;
    if grid == 0 || scores.len() % grid != 0 {
        warn!("SCRFD stride {}: {} scores do not fit a {}x{} grid", stride, scores.len(), side, side);
        return Vec::new();
    }
    let anchors = scores.len() / grid;
    let s = stride as f32;
    let mut out = Vec::new();
    for (idx, &score) in scores.iter().enumerate() {
        if score < threshold {
            continue;
        }
        let cell = idx / anchors;
        let cx = (cell % side) as f32 * s;
        let cy = (cell / side) as f32 * s;
        let Some(d) = boxes.get(idx * 4..idx * 4 + 4) else {
            break;
        };
        let c = Candidate {
            x1: cx - d[0] * s,
            y1: cy - d[1] * s,
            x2: cx + d[2] * s,
            y2: cy + d[3] * s,
            score,
        };
        if c.width() > 0.0 && c.height() > 0.0 {
            out.push(c);
        }
    }
    out
}

/// Non-maximum suppression that also counts, for every kept box, how many
/// candidates it absorbed. Boxes with fewer than `min_neighbors` are dropped.
fn suppress(candidates: &[Candidate], iou_threshold: f32, min_neighbors: usize) -> Vec<Candidate> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .score
            .partial_cmp(&candidates[a].score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut suppressed = vec![false; candidates.len()];
    let mut keep = Vec::new();
    for (i, &ia) in order.iter().enumerate() {
        if suppressed[ia] {
            continue;
        }
        let mut neighbors = 0;
        for &ib in order.iter().skip(i + 1) {
            if !suppressed[ib] && iou(&candidates[ia], &candidates[ib]) > iou_threshold {
                suppressed[ib] = true;
                neighbors += 1;
            }
        }
        if neighbors >= min_neighbors {
            keep.push(candidates[ia]);
        }
    }
    keep
}

fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let inter = (x2 - x1) * (y2 - y1);
    let union = a.width() * a.height() + b.width() * b.height() - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

async fn download_model(path: &Path) -> Result<()> {
    let client = http_client()?;
    info!("Downloading SCRFD face detection model...");
    if let Err(e) = download_file(&client, MODEL_URL_HF, path).await {
        warn!("Failed to download from Hugging Face: {}. Trying GitHub...", e);
        download_file(&client, MODEL_URL_GH, path).await?;
    }
    Ok(())
}

fn http_client() -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Ok(token) = std::env::var("HF_TOKEN") {
        if !token.is_empty() {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
    }
    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .context("Failed to create HTTP client")
}

async fn download_file(client: &reqwest::Client, url: &str, path: &Path) -> Result<()> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download model from {}", url))?;
    if !response.status().is_success() {
        anyhow::bail!("Failed to download model: HTTP {}", response.status());
    }
    let bytes = response.bytes().await.context("Failed to read response body")?;
    // ONNX files are never this small; an HTML error page is
    if bytes.len() < 1024 {
        anyhow::bail!("Downloaded file is suspiciously small ({} bytes), may be corrupted", bytes.len());
    }
    let tmp = path.with_extension("part");
    tokio::fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("Failed to write file: {:?}", tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move model into place: {:?}", path))?;
    info!("Downloaded model to {:?} ({} bytes)", path, bytes.len());
    Ok(())
}

use std::convert::TryFrom;
use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, GrayImage, ImageOutputFormat};
use imageproc::contrast::threshold;
use jpeg_encoder::SamplingFactor;
use log::{debug, info};

use crate::symbol::{self, SymbolConfig};
use crate::viewer::Viewer;

#[cfg(test)]
use std::cell::RefCell;

const DEFAULT_FILE_NAME: &str = "output.png";
const BLACK_AND_WHITE_THRESHOLD: u8 = 127;
const JPEG_QUALITY: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ascii,
    File,
    Display,
}

/// Everything needed to produce one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    text: String,
    destination: Option<PathBuf>,
    mode: Mode,
}

impl EncodeRequest {
    /// The ascii flag wins over a destination, which in turn wins over the
    /// viewer. `text` must not be blank; input resolution rejects that first.
    pub fn new(text: String, destination: Option<PathBuf>, ascii: bool) -> Self {
        debug_assert!(!text.trim().is_empty(), "blank text reached the encoder");

        let mode = match (ascii, &destination) {
            (true, _) => Mode::Ascii,
            (false, Some(_)) => Mode::File,
            (false, None) => Mode::Display,
        };

        EncodeRequest {
            text,
            destination,
            mode,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Png,
    Jpeg,
    Gif,
}

impl Format {
    fn from_extension(extension: &OsStr) -> Option<Self> {
        match extension.to_str()?.to_ascii_lowercase().as_str() {
            "png" => Some(Format::Png),
            "jpg" | "jpeg" => Some(Format::Jpeg),
            "gif" => Some(Format::Gif),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutput {
    pub format: Format,
    pub path: PathBuf,
}

impl ResolvedOutput {
    pub fn resolve(destination: &Path) -> Self {
        Self::from_expanded(expand_home(destination))
    }

    fn from_expanded(path: PathBuf) -> Self {
        if path.is_dir() {
            return ResolvedOutput {
                format: Format::Png,
                path: path.join(DEFAULT_FILE_NAME),
            };
        }

        match path.extension().and_then(Format::from_extension) {
            Some(format) => ResolvedOutput { format, path },

            // photo -> photo.png, photo.xyz -> photo.xyz.png
            None => {
                let mut path = path.into_os_string();
                path.push(".png");

                ResolvedOutput {
                    format: Format::Png,
                    path: PathBuf::from(path),
                }
            }
        }
    }
}

pub fn expand_home(path: &Path) -> PathBuf {
    expand_home_with(path, home_dir())
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

fn expand_home_with(path: &Path, home: Option<PathBuf>) -> PathBuf {
    let mut components = path.components();

    match (components.next(), home) {
        (Some(Component::Normal(first)), Some(home)) if first == OsStr::new("~") => {
            let rest = components.as_path();

            if rest.as_os_str().is_empty() {
                home
            } else {
                home.join(rest)
            }
        }

        _ => path.to_path_buf(),
    }
}

/// Renders the request in its mode: text art to `out`, a file on disk, or the
/// viewer.
pub fn dispatch<W, V>(
    request: &EncodeRequest,
    config: &SymbolConfig,
    out: &mut W,
    viewer: &V,
) -> Result<()>
where
    W: Write,
    V: Viewer + ?Sized,
{
    let code = symbol::build(request.text(), config)?;

    match (request.mode(), request.destination()) {
        (Mode::Ascii, _) => {
            writeln!(out, "{}", symbol::render_ascii(&code))?;
        }

        (Mode::File, Some(destination)) => {
            let resolved = save(&symbol::render_bitmap(&code, config), destination)?;

            writeln!(out, "💾 Saved QR to {}", resolved.path.display())?;
        }

        _ => viewer.show(&symbol::render_bitmap(&code, config))?,
    }

    Ok(())
}

/// Writes the image to `destination` in the format its name asks for.
///
/// The file is encoded in memory first, so a failure never leaves a
/// half-written image behind.
pub fn save(image: &GrayImage, destination: &Path) -> Result<ResolvedOutput> {
    let resolved = ResolvedOutput::resolve(destination);

    debug!(
        "resolved {} to {} as {:?}",
        destination.display(),
        resolved.path.display(),
        resolved.format
    );

    let bytes = encode(&to_black_and_white(image), resolved.format)?;

    fs::write(&resolved.path, bytes)
        .with_context(|| format!("failed to write {}", resolved.path.display()))?;

    info!("saved {:?} image to {}", resolved.format, resolved.path.display());

    Ok(resolved)
}

pub fn to_black_and_white(image: &GrayImage) -> GrayImage {
    threshold(image, BLACK_AND_WHITE_THRESHOLD)
}

fn encode(image: &GrayImage, format: Format) -> Result<Vec<u8>> {
    let (width, height) = image.dimensions();
    let mut bytes = Vec::new();

    match format {
        Format::Png => {
            PngEncoder::new_with_quality(&mut bytes, CompressionType::Best, FilterType::Adaptive)
                .encode(image.as_raw(), width, height, ColorType::L8)
                .context("failed to encode Png image")?
        }

        Format::Jpeg => encode_jpeg(image, &mut bytes, true)?,

        Format::Gif => DynamicImage::ImageLuma8(image.clone())
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageOutputFormat::Gif)
            .context("failed to encode Gif image")?,
    }

    Ok(bytes)
}

/// Maximum quality without chroma subsampling, with Huffman tables fitted to
/// the image when `optimize` is set.
fn encode_jpeg(image: &GrayImage, bytes: &mut Vec<u8>, optimize: bool) -> Result<()> {
    let (width, height) = image.dimensions();
    let width = u16::try_from(width).context("image too wide for JPEG")?;
    let height = u16::try_from(height).context("image too tall for JPEG")?;

    let mut encoder = jpeg_encoder::Encoder::new(bytes, JPEG_QUALITY);
    encoder.set_sampling_factor(SamplingFactor::R_4_4_4);
    encoder.set_optimized_huffman_tables(optimize);

    encoder
        .encode(image.as_raw(), width, height, jpeg_encoder::ColorType::Luma)
        .context("failed to encode Jpeg image")
}

#[cfg(test)]
#[derive(Default)]
struct RecordingViewer {
    shown: RefCell<Vec<(u32, u32)>>,
}

#[cfg(test)]
impl Viewer for RecordingViewer {
    fn show(&self, image: &GrayImage) -> Result<()> {
        self.shown.borrow_mut().push(image.dimensions());
        Ok(())
    }
}

#[test]
fn encode_request_mode_test() {
    let text = String::from("hello");

    assert_eq!(
        Mode::Ascii,
        EncodeRequest::new(text.clone(), Some(PathBuf::from("out.png")), true).mode()
    );
    assert_eq!(Mode::Ascii, EncodeRequest::new(text.clone(), None, true).mode());
    assert_eq!(
        Mode::File,
        EncodeRequest::new(text.clone(), Some(PathBuf::from("out.png")), false).mode()
    );
    assert_eq!(Mode::Display, EncodeRequest::new(text, None, false).mode());
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "blank text")]
fn encode_request_blank_text_test() {
    EncodeRequest::new(String::from(" \n\t"), None, true);
}

#[test]
fn resolve_directory_test() {
    let dir = tempfile::tempdir().unwrap();

    assert_eq!(
        ResolvedOutput {
            format: Format::Png,
            path: dir.path().join("output.png"),
        },
        ResolvedOutput::resolve(dir.path())
    );
}

#[test]
fn resolve_extension_test() {
    let cases = [
        ("qr.png", Format::Png, "qr.png"),
        ("qr.PNG", Format::Png, "qr.PNG"),
        ("img.JPG", Format::Jpeg, "img.JPG"),
        ("img.jpg", Format::Jpeg, "img.jpg"),
        ("img.Jpeg", Format::Jpeg, "img.Jpeg"),
        ("anim.gif", Format::Gif, "anim.gif"),
        ("photo", Format::Png, "photo.png"),
        ("photo.xyz", Format::Png, "photo.xyz.png"),
        ("nested/dir/photo", Format::Png, "nested/dir/photo.png"),
    ];

    for (destination, format, path) in &cases {
        assert_eq!(
            ResolvedOutput {
                format: *format,
                path: PathBuf::from(path),
            },
            ResolvedOutput::resolve(Path::new(destination)),
            "{}",
            destination
        );
    }
}

#[test]
fn expand_home_test() {
    let home = Some(PathBuf::from("/home/someone"));

    assert_eq!(
        PathBuf::from("/home/someone/qr.png"),
        expand_home_with(Path::new("~/qr.png"), home.clone())
    );
    assert_eq!(
        PathBuf::from("/home/someone"),
        expand_home_with(Path::new("~"), home.clone())
    );
    assert_eq!(
        PathBuf::from("/tmp/~/qr.png"),
        expand_home_with(Path::new("/tmp/~/qr.png"), home.clone())
    );
    assert_eq!(
        PathBuf::from("~user/qr.png"),
        expand_home_with(Path::new("~user/qr.png"), home)
    );
    assert_eq!(
        PathBuf::from("~/qr.png"),
        expand_home_with(Path::new("~/qr.png"), None)
    );
}

#[test]
fn to_black_and_white_test() {
    let gray = GrayImage::from_raw(4, 1, vec![0, 100, 200, 255]).unwrap();

    assert_eq!(
        vec![0, 0, 255, 255],
        to_black_and_white(&gray).into_raw()
    );
}

#[test]
fn dispatch_ascii_test() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("ignored.png");
    let request = EncodeRequest::new(String::from("hello"), Some(destination.clone()), true);
    let viewer = RecordingViewer::default();
    let mut out = Vec::new();

    dispatch(&request, &SymbolConfig::default(), &mut out, &viewer).unwrap();

    let out = String::from_utf8(out).unwrap();

    assert!(out.contains('█'));
    assert!(!out.contains("Saved"));
    assert!(!destination.exists());
    assert!(viewer.shown.borrow().is_empty());
}

#[test]
fn dispatch_display_test() {
    let request = EncodeRequest::new(String::from("hello"), None, false);
    let viewer = RecordingViewer::default();
    let mut out = Vec::new();

    dispatch(&request, &SymbolConfig::default(), &mut out, &viewer).unwrap();

    assert!(out.is_empty());
    assert_eq!(vec![(138, 138)], *viewer.shown.borrow());
}

#[test]
fn dispatch_file_test() {
    let dir = tempfile::tempdir().unwrap();
    let request = EncodeRequest::new(String::from("hello"), Some(dir.path().join("photo")), false);
    let viewer = RecordingViewer::default();
    let mut out = Vec::new();

    dispatch(&request, &SymbolConfig::default(), &mut out, &viewer).unwrap();

    let saved = dir.path().join("photo.png");

    assert_eq!(
        format!("💾 Saved QR to {}\n", saved.display()),
        String::from_utf8(out).unwrap()
    );
    assert!(viewer.shown.borrow().is_empty());

    let image = image::open(&saved).unwrap().to_luma8();

    assert_eq!((138, 138), image.dimensions());
    assert!(image.pixels().all(|pixel| pixel[0] == 0 || pixel[0] == 255));
}

#[test]
fn save_formats_test() {
    let dir = tempfile::tempdir().unwrap();
    let config = SymbolConfig::default();
    let image = symbol::render_bitmap(&symbol::build("hello", &config).unwrap(), &config);

    let png = save(&image, &dir.path().join("qr.png")).unwrap();
    assert_eq!(b"\x89PNG", &fs::read(&png.path).unwrap()[..4]);

    let jpeg = save(&image, &dir.path().join("img.JPG")).unwrap();
    assert_eq!(Format::Jpeg, jpeg.format);
    assert_eq!(&[0xff, 0xd8], &fs::read(&jpeg.path).unwrap()[..2]);
    assert_eq!(
        (138, 138),
        image::open(&jpeg.path).unwrap().to_luma8().dimensions()
    );

    let gif = save(&image, &dir.path().join("anim.gif")).unwrap();
    assert_eq!(b"GIF8", &fs::read(&gif.path).unwrap()[..4]);

    let in_dir = save(&image, dir.path()).unwrap();
    assert_eq!(dir.path().join("output.png"), in_dir.path);
    assert!(in_dir.path.is_file());
}

#[test]
fn save_unwritable_test() {
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("missing").join("qr.png");
    let config = SymbolConfig::default();
    let image = symbol::render_bitmap(&symbol::build("hello", &config).unwrap(), &config);

    let error = save(&image, &destination).unwrap_err();

    assert!(error.to_string().contains("failed to write"));
    assert!(!destination.exists());
}

#[test]
fn encode_jpeg_optimized_test() {
    let config = SymbolConfig::default();
    let image = to_black_and_white(&symbol::render_bitmap(
        &symbol::build("https://example.com/some/longer/payload", &config).unwrap(),
        &config,
    ));

    let mut optimized = Vec::new();
    encode_jpeg(&image, &mut optimized, true).unwrap();

    let mut baseline = Vec::new();
    encode_jpeg(&image, &mut baseline, false).unwrap();

    assert!(optimized.len() < baseline.len());
    assert_eq!(optimized, encode(&image, Format::Jpeg).unwrap());

    let decoded = image::load_from_memory(&optimized).unwrap().to_luma8();

    assert_eq!(image.dimensions(), decoded.dimensions());
}

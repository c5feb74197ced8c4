//! Rendering utilities for symbols produced by [`crate::qrcode::generate`].
//!
//! The encoder writes a bitmap where a set bit is a light module. These helpers paint set bits
//! and the quiet zone white and everything else black, so the output is a regular QR code.
//! Unlike the encoder, they allocate.
use crate::qrcode::{generate, Version};

use image::{ImageBuffer, Luma};
use log::debug;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Width of the quiet zone used by [`print_qr`] and [`qr_to_image_and_save`], in modules.
const BORDER: u32 = 4;

/// A read-only view over a generated symbol bitmap.
#[derive(Clone, Copy, Debug)]
pub struct QrBitmap<'a> {
    width: u8,
    stride: usize,
    modules: &'a [u8],
}

impl<'a> QrBitmap<'a> {
    /// Wraps the bitmap of a `width` x `width` symbol.
    ///
    /// # Returns
    ///
    /// `None` if `width` is not the width of a QR version, or `modules` is shorter than the
    /// bitmap of that version.
    pub fn new(width: u8, modules: &'a [u8]) -> Option<Self> {
        let ver = width.checked_sub(17)?;
        if ver % 4 != 0 {
            return None;
        }
        let version = Version::new(ver / 4)?;
        if modules.len() < version.image_len() {
            return None;
        }
        Some(Self {
            width,
            stride: version.stride(),
            modules,
        })
    }

    /// Returns this symbol's width and height, in modules.
    pub fn size(&self) -> i32 {
        i32::from(self.width)
    }

    /// Returns the bit of the module at (x, y), or `false` outside the symbol.
    pub fn get_module(&self, x: i32, y: i32) -> bool {
        if !(0..self.size()).contains(&x) || !(0..self.size()).contains(&y) {
            return false;
        }
        let offset = y as usize * self.stride + x as usize / 8;
        self.modules[offset] & (0x80u8 >> (x % 8)) != 0
    }

    /// Returns whether the module at (x, y) is printed dark. The quiet zone is light.
    pub fn is_dark(&self, x: i32, y: i32) -> bool {
        (0..self.size()).contains(&x) && (0..self.size()).contains(&y) && !self.get_module(x, y)
    }
}

// Returns a string of SVG code for an image depicting
// the given QR Code, with the given number of border modules.
// The string always uses Unix newlines (\n), regardless of the platform.
pub fn to_svg_string(qr: &QrBitmap<'_>, border: u32) -> String {
    let mut result = String::new();
    result += "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
    result += "<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\">\n";
    let dimension = qr.size() as u32 + border * 2;
    result += &format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" viewBox=\"0 0 {0} {0}\" stroke=\"none\">\n",
        dimension
    );
    result += "\t<rect width=\"100%\" height=\"100%\" fill=\"#FFFFFF\"/>\n";
    result += "\t<path d=\"";
    let mut first = true;
    for y in 0..qr.size() {
        for x in 0..qr.size() {
            if qr.is_dark(x, y) {
                if !first {
                    result += " ";
                }
                first = false;
                result += &format!("M{},{}h1v1h-1z", x as u32 + border, y as u32 + border);
            }
        }
    }
    result += "\" fill=\"#000000\"/>\n";
    result += "</svg>\n";
    result
}

/// Prints the given symbol to the console.
pub fn print_qr(qr: &QrBitmap<'_>) {
    let border = BORDER as i32;
    for y in -border..qr.size() + border {
        for x in -border..qr.size() + border {
            let c: char = if qr.is_dark(x, y) { '█' } else { ' ' };
            print!("{0}{0}", c);
        }
        println!();
    }
    println!();
}

/// Renders the symbol as a grayscale image.
///
/// # Arguments
///
/// * `qr` - The symbol to render.
/// * `border` - Quiet zone width, in modules.
/// * `scale` - Pixels per module; 0 is treated as 1.
///
/// # Returns
///
/// An `ImageBuffer` with dark modules at 0 and light modules at 255.
pub fn to_image_buffer(qr: &QrBitmap<'_>, border: u32, scale: u32) -> ImageBuffer<Luma<u8>, Vec<u8>> {
    let scale = scale.max(1);
    let size = (qr.size() as u32 + 2 * border) * scale;

    ImageBuffer::from_fn(size, size, |x, y| {
        let qr_x = (x / scale) as i32 - border as i32;
        let qr_y = (y / scale) as i32 - border as i32;
        if qr.is_dark(qr_x, qr_y) {
            Luma([0u8]) // Black
        } else {
            Luma([255u8]) // White
        }
    })
}

/// Converts a symbol to an image and saves it as a PNG file.
///
/// # Arguments
///
/// * `qr` - The symbol to convert.
/// * `directory_path` - Optional. The directory where the image is saved, "generated" by default.
///   It is created if missing.
/// * `filename` - Optional. The file name without extension. Defaults to a timestamp.
///
/// # Errors
///
/// Returns an `image::ImageError` if the directory cannot be created or the image cannot be
/// written.
///
/// # Example
///
/// ```rust,no_run
/// use panicqr::helper::{qr_to_image_and_save, QrBitmap};
/// use panicqr::qrcode::{generate, Version};
///
/// let mut image = vec![0u8; Version::MAX.image_len()];
/// let mut tmp = vec![0u8; Version::MAX.work_len()];
/// let width = generate(None, b"Hello, World!", 1, &mut image, &mut tmp);
///
/// let qr = QrBitmap::new(width, &image).unwrap();
/// qr_to_image_and_save(&qr, Some("images"), Some("qr_code")).unwrap();
/// ```
pub fn qr_to_image_and_save(
    qr: &QrBitmap<'_>,
    directory_path: Option<&str>,
    filename: Option<&str>
) -> Result<(), image::ImageError> {
    let img = to_image_buffer(qr, BORDER, 1);

    let directory_path = directory_path.unwrap_or("generated");
    let filename = match filename {
        Some(name) => name.to_string(),
        None => {
            let since_the_epoch = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            format!("qr_{}", since_the_epoch)
        }
    };

    let file_path = Path::new(directory_path).join(format!("{}.png", filename));

    fs::create_dir_all(directory_path)?;
    img.save(&file_path)?;
    debug!("helper: saved {}x{} symbol to {}", qr.size(), qr.size(), file_path.display());
    Ok(())
}

/// Generates a symbol and renders it as a grayscale image.
///
/// # Arguments
///
/// * `url` - Optional URL prefix, see [`generate`].
/// * `data` - The payload.
/// * `version` - The QR version to use, 1 to 40.
/// * `scale` - Pixels per module.
///
/// # Returns
///
/// The image with a 4 module quiet zone, or `None` if [`generate`] refused the input.
///
/// # Example
///
/// ```
/// use panicqr::helper::generate_image_buffer;
///
/// let img = generate_image_buffer(None, b"Hello, World!", 1, 1).unwrap();
/// assert_eq!(img.dimensions(), (29, 29));
/// ```
pub fn generate_image_buffer(
    url: Option<&str>,
    data: &[u8],
    version: u8,
    scale: u32
) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
    let mut image = vec![0u8; Version::MAX.image_len()];
    let mut tmp = vec![0u8; Version::MAX.work_len()];
    let width = generate(url, data, version, &mut image, &mut tmp);
    let qr = QrBitmap::new(width, &image)?;
    Some(to_image_buffer(&qr, BORDER, scale))
}

// Tests
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn symbol(data: &[u8], version: u8) -> (u8, Vec<u8>) {
        let mut image = vec![0u8; Version::MAX.image_len()];
        let mut tmp = vec![0u8; Version::MAX.work_len()];
        let width = generate(None, data, version, &mut image, &mut tmp);
        (width, image)
    }

    #[test]
    fn test_bitmap_new() {
        let buf = vec![0u8; Version::MAX.image_len()];
        assert!(QrBitmap::new(21, &buf).is_some());
        assert!(QrBitmap::new(177, &buf).is_some());
        assert!(QrBitmap::new(0, &buf).is_none());
        assert!(QrBitmap::new(17, &buf).is_none());
        assert!(QrBitmap::new(22, &buf).is_none());
        assert!(QrBitmap::new(181, &buf).is_none());
        assert!(QrBitmap::new(177, &buf[..4070]).is_none());
        assert!(QrBitmap::new(21, &buf[..63]).is_some());
    }

    #[test]
    fn test_get_module_bounds() {
        let buf = vec![0xffu8; 63];
        let qr = QrBitmap::new(21, &buf).unwrap();
        assert!(qr.get_module(0, 0));
        assert!(qr.get_module(20, 20));
        assert!(!qr.get_module(-1, 0));
        assert!(!qr.get_module(21, 0));
        assert!(!qr.is_dark(5, 5));
        assert!(!qr.is_dark(-1, -1));
    }

    #[test]
    fn test_finder_polarity() {
        let (width, image) = symbol(b"polarity", 1);
        let qr = QrBitmap::new(width, &image).unwrap();
        // outer ring dark, ring inside it light, 3x3 centre dark, separator light
        assert!(qr.is_dark(0, 0));
        assert!(!qr.is_dark(1, 1));
        assert!(qr.is_dark(3, 3));
        assert!(!qr.is_dark(7, 7));
        assert!(qr.is_dark(20, 0));
        assert!(qr.is_dark(0, 20));
        // the dark module next to the bottom left finder
        assert!(qr.is_dark(8, 13));
    }

    #[test]
    fn test_print_qr() {
        let (width, image) = symbol(b"console", 1);
        print_qr(&QrBitmap::new(width, &image).unwrap());
    }

    #[test]
    fn test_to_svg_string() {
        let (width, image) = symbol(b"HELLO WORLD", 1);
        let qr = QrBitmap::new(width, &image).unwrap();
        let svg = to_svg_string(&qr, 4);

        assert!(svg.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(svg.contains("viewBox=\"0 0 29 29\""));
        assert!(svg.contains("\"M4,4h1v1h-1z M5,4h1v1h-1z"));
        assert!(!svg.contains("M5,5h1v1h-1z"));
        assert!(svg.ends_with("</svg>\n"));
    }

    #[test]
    fn test_generate_image_buffer() {
        // version 1 is 21 modules, plus a border of 4 on each side
        let img = generate_image_buffer(None, b"Hello, world!", 1, 1).unwrap();
        assert_eq!(img.dimensions(), (29, 29));
        assert_eq!(img.get_pixel(0, 0)[0], 255);
        assert_eq!(img.get_pixel(4, 4)[0], 0);
        assert_eq!(img.get_pixel(5, 5)[0], 255);

        let img = generate_image_buffer(Some("https://a.io/?z="), &[0xde, 0xad], 2, 3).unwrap();
        assert_eq!(img.dimensions(), (99, 99));

        assert!(generate_image_buffer(None, &[0; 17], 1, 1).is_none());
        assert!(generate_image_buffer(None, b"x", 41, 1).is_none());
    }

    #[test]
    fn test_qr_to_image_and_save() {
        let (width, image) = symbol(b"saved", 3);
        let qr = QrBitmap::new(width, &image).unwrap();
        let dir = std::env::temp_dir().join(format!("panicqr-{}", std::process::id()));
        let dir_str = dir.to_str().unwrap();

        qr_to_image_and_save(&qr, Some(dir_str), Some("symbol")).unwrap();
        let saved = image::open(dir.join("symbol.png")).unwrap().into_luma8();
        assert_eq!(saved, to_image_buffer(&qr, BORDER, 1));
        fs::remove_dir_all(&dir).unwrap();
    }
}

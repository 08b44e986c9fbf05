//! Linux fbdev surface
//!
//! Maps `/dev/fb*` into the process and reads geometry through the
//! `FBIOGET_FSCREENINFO` / `FBIOGET_VSCREENINFO` ioctls. Devices with a
//! virtual height larger than the visible height are page flipped by the
//! display driver; the visible page is `yoffset` in the variable screen info.

use super::{Surface, SurfaceGeometry};
use crate::error::{Error, Result};
use crate::types::PixelFormat;

use std::fs::File;
use std::path::Path;

const FBIOGET_VSCREENINFO: u32 = 0x4600;
const FBIOGET_FSCREENINFO: u32 = 0x4602;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
#[allow(dead_code)]
struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
#[allow(dead_code)]
struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
#[allow(dead_code)]
struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

/// Memory-mapped framebuffer device
pub struct FbdevSurface {
    file: File,
    ptr: *mut u8,
    len: usize,
    geometry: SurfaceGeometry,
    pixel_format: PixelFormat,
    last_page_offset: u32,
}

// SAFETY: the mapping is owned exclusively by this value and only touched
// through `&mut self`.
unsafe impl Send for FbdevSurface {}

impl FbdevSurface {
    /// Open and map a framebuffer device
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::SurfaceOpen(format!("{}: {}", path.display(), e)))?;

        let finfo: FbFixScreeninfo = ioctl_read(&file, FBIOGET_FSCREENINFO)
            .map_err(|e| Error::SurfaceGeometry(format!("FBIOGET_FSCREENINFO: {}", e)))?;
        let vinfo: FbVarScreeninfo = ioctl_read(&file, FBIOGET_VSCREENINFO)
            .map_err(|e| Error::SurfaceGeometry(format!("FBIOGET_VSCREENINFO: {}", e)))?;

        let geometry = SurfaceGeometry {
            width: vinfo.xres,
            height: vinfo.yres,
            stride_bytes: finfo.line_length,
            bpp: vinfo.bits_per_pixel,
            total_size_bytes: finfo.smem_len as usize,
        };
        geometry.validate()?;

        let id_len = finfo.id.iter().position(|&b| b == 0).unwrap_or(finfo.id.len());
        let id = String::from_utf8_lossy(&finfo.id[..id_len]).into_owned();

        tracing::info!(
            "fbdev {} ({}): {}x{}, {} bpp, stride={}, size={}",
            path.display(),
            id,
            geometry.width,
            geometry.height,
            geometry.bpp,
            geometry.stride_bytes,
            geometry.total_size_bytes
        );
        tracing::info!(
            "fbdev virtual: {}x{}, offset: {},{}",
            vinfo.xres_virtual,
            vinfo.yres_virtual,
            vinfo.xoffset,
            vinfo.yoffset
        );

        let ptr = map_shared(&file, geometry.total_size_bytes)?;

        Ok(Self {
            file,
            ptr,
            len: geometry.total_size_bytes,
            geometry,
            pixel_format: pixel_format_from(&vinfo),
            last_page_offset: vinfo.yoffset,
        })
    }
}

impl Surface for FbdevSurface {
    fn name(&self) -> &'static str {
        "fbdev"
    }

    fn geometry(&self) -> SurfaceGeometry {
        self.geometry
    }

    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn query_page_offset(&mut self) -> u32 {
        match ioctl_read::<FbVarScreeninfo>(&self.file, FBIOGET_VSCREENINFO) {
            Ok(vinfo) => self.last_page_offset = vinfo.yoffset,
            Err(e) => tracing::debug!("FBIOGET_VSCREENINFO failed, reusing offset: {}", e),
        }
        self.last_page_offset
    }

    fn memory(&mut self) -> &mut [u8] {
        // SAFETY: `ptr` maps `len` bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for FbdevSurface {
    fn drop(&mut self) {
        if !self.ptr.is_null() && self.len > 0 {
            let _ = unsafe { libc::munmap(self.ptr.cast(), self.len) };
            tracing::debug!("fbdev unmapped ({} bytes)", self.len);
        }
    }
}

/// Byte order from the red channel position
fn pixel_format_from(vinfo: &FbVarScreeninfo) -> PixelFormat {
    match vinfo.red.offset {
        0 => PixelFormat::Rgba,
        16 => PixelFormat::Bgra,
        other => {
            tracing::warn!("Unusual red offset {}, assuming BGRA", other);
            PixelFormat::Bgra
        }
    }
}

#[cfg(target_os = "linux")]
fn ioctl_read<T: Default>(file: &File, request: u32) -> std::io::Result<T> {
    use std::os::unix::io::AsRawFd;

    let mut value = T::default();
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), request as _, &mut value as *mut T) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(value)
}

#[cfg(not(target_os = "linux"))]
fn ioctl_read<T: Default>(_file: &File, _request: u32) -> std::io::Result<T> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "fbdev is only available on Linux",
    ))
}

#[cfg(unix)]
fn map_shared(file: &File, len: usize) -> Result<*mut u8> {
    use std::os::unix::io::AsRawFd;

    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(Error::SurfaceMap(
            std::io::Error::last_os_error().to_string(),
        ));
    }
    Ok(ptr.cast())
}

#[cfg(not(unix))]
fn map_shared(_file: &File, _len: usize) -> Result<*mut u8> {
    Err(Error::BackendUnavailable("mmap not supported".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screeninfo_layout() {
        // Kernel ABI sizes
        assert_eq!(std::mem::size_of::<FbVarScreeninfo>(), 160);
        if std::mem::size_of::<libc::c_ulong>() == 8 {
            assert_eq!(std::mem::size_of::<FbFixScreeninfo>(), 80);
        } else {
            assert_eq!(std::mem::size_of::<FbFixScreeninfo>(), 68);
        }
    }

    #[test]
    fn test_pixel_format_from_red_offset() {
        let mut vinfo = FbVarScreeninfo::default();
        vinfo.red.offset = 16;
        assert_eq!(pixel_format_from(&vinfo), PixelFormat::Bgra);
        vinfo.red.offset = 0;
        assert_eq!(pixel_format_from(&vinfo), PixelFormat::Rgba);
    }

    #[test]
    fn test_open_missing_device() {
        let dir = tempfile::tempdir().unwrap();
        let err = FbdevSurface::open(dir.path().join("fb9")).err().unwrap();
        assert!(matches!(err, Error::SurfaceOpen(_)));
        assert!(err.is_device_issue());
    }

    #[test]
    fn test_regular_file_is_not_a_framebuffer() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = FbdevSurface::open(file.path()).err().unwrap();
        assert!(matches!(err, Error::SurfaceGeometry(_)));
    }

    #[test]
    fn test_real_device_if_present() {
        if !Path::new("/dev/fb0").exists() {
            println!("/dev/fb0 not present, skipping test");
            return;
        }
        match FbdevSurface::open("/dev/fb0") {
            Ok(mut surface) => {
                let geometry = surface.geometry();
                assert!(geometry.validate().is_ok());
                assert!(surface.query_page_offset() < geometry.total_rows());
            }
            Err(e) => println!("fbdev not usable: {}", e),
        }
    }
}

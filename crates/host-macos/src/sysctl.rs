use libc::sysctlbyname;
use std::ffi::CString;
use std::ptr;

/// String-valued sysctl, e.g. `machdep.cpu.brand_string`.
pub fn string(name: &str) -> Option<String> {
    let c_name = CString::new(name).ok()?;
    let mut size = 0usize;
    let res = unsafe { sysctlbyname(c_name.as_ptr(), ptr::null_mut(), &mut size, ptr::null_mut(), 0) };
    if res != 0 || size == 0 {
        return None;
    }

    let mut buffer = vec![0u8; size];
    let res = unsafe {
        sysctlbyname(
            c_name.as_ptr(),
            buffer.as_mut_ptr() as *mut _,
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if res != 0 {
        return None;
    }
    buffer.truncate(size);
    if let Some(0) = buffer.last().copied() {
        buffer.pop();
    }
    String::from_utf8(buffer).ok()
}

/// Integer-valued sysctl such as `hw.ncpu` or `hw.memsize`.
pub fn number(name: &str) -> Option<u64> {
    let c_name = CString::new(name).ok()?;
    let mut value = 0u64;
    let mut size = std::mem::size_of::<u64>();
    let res = unsafe {
        sysctlbyname(
            c_name.as_ptr(),
            &mut value as *mut u64 as *mut _,
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    match (res, size) {
        (0, 4) => Some(value & 0xffff_ffff),
        (0, 8) => Some(value),
        _ => None,
    }
}

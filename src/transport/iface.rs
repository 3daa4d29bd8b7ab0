//! Interface-name resolution, grounded on the `libc::if_nametoindex` pattern
//! used elsewhere in this corpus for multicast interface binding.

use std::ffi::CString;
use std::net::Ipv4Addr;

/// Resolves a network interface name to its kernel index.
///
/// Tries the name as given first; if that fails, falls back to a
/// friendly-name variant (lowercased, since some configs are authored with
/// the display name a platform shows rather than the kernel's device name).
pub fn resolve_interface(name: &str) -> std::io::Result<u32> {
    if let Ok(index) = if_nametoindex(name) {
        return Ok(index);
    }
    let lowered = name.to_ascii_lowercase();
    if lowered != name {
        if let Ok(index) = if_nametoindex(&lowered) {
            return Ok(index);
        }
    }
    Err(std::io::Error::last_os_error())
}

fn if_nametoindex(name: &str) -> std::io::Result<u32> {
    let c_name = CString::new(name)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "interface name contains a NUL byte"))?;
    // SAFETY: `c_name` is a valid NUL-terminated string for the duration of
    // the call; `if_nametoindex` only reads it and returns 0 on failure.
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(index)
    }
}

/// Looks up the first IPv4 address bound to the given interface index, for
/// use as the "outbound interface" argument to `join_multicast_v4`.
pub fn ipv4_address_of_index(index: u32) -> std::io::Result<Ipv4Addr> {
    let mut name_buf = [0u8; libc::IF_NAMESIZE];
    // SAFETY: `index` is passed through as received; `if_indextoname` writes
    // at most `IF_NAMESIZE` bytes including the NUL terminator into `name_buf`.
    let result = unsafe { libc::if_indextoname(index, name_buf.as_mut_ptr() as *mut libc::c_char) };
    if result.is_null() {
        return Err(std::io::Error::last_os_error());
    }
    let name_len = name_buf.iter().position(|&b| b == 0).unwrap_or(name_buf.len());
    let name = String::from_utf8_lossy(&name_buf[..name_len]).into_owned();

    let mut addrs: *mut libc::ifaddrs = std::ptr::null_mut();
    // SAFETY: `addrs` receives a heap-allocated linked list owned by libc;
    // it is always freed via `freeifaddrs` below, including on the error path.
    if unsafe { libc::getifaddrs(&mut addrs) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let mut found = None;
    let mut cursor = addrs;
    while !cursor.is_null() {
        // SAFETY: `cursor` is non-null and was produced by `getifaddrs`,
        // which guarantees each node's `ifa_name` is a valid C string.
        let entry = unsafe { &*cursor };
        let entry_name = unsafe { std::ffi::CStr::from_ptr(entry.ifa_name) }.to_string_lossy();
        if entry_name == name && !entry.ifa_addr.is_null() {
            // SAFETY: a non-null `ifa_addr` is a valid `sockaddr` for at
            // least `sockaddr_in`'s size when `sa_family` is `AF_INET`.
            let sockaddr = unsafe { &*(entry.ifa_addr as *const libc::sockaddr) };
            if i32::from(sockaddr.sa_family) == libc::AF_INET {
                let sockaddr_in = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in) };
                found = Some(Ipv4Addr::from(u32::from_be(sockaddr_in.sin_addr.s_addr)));
                break;
            }
        }
        cursor = entry.ifa_next;
    }

    // SAFETY: `addrs` was allocated by the `getifaddrs` call above and has
    // not been freed yet.
    unsafe { libc::freeifaddrs(addrs) };

    found.ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no IPv4 address on interface"))
}

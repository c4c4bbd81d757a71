/// Name of the machine the receiver runs on, for the report header.
#[cfg(unix)]
pub fn hostname() -> String {
    let mut buf = [0u8; 256];

    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "unknown".to_string();
    }

    // POSIX leaves truncated names without a terminator
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(not(unix))]
pub fn hostname() -> String {
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    #[test]
    fn hostname_is_printable() {
        let name = super::hostname();
        assert!(!name.is_empty());
        assert!(!name.contains('\0'));
    }
}

// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs::{File, FileType};
use std::io::{self, IsTerminal, Read};

use qnet_core::common::{Error, ErrorCode, ErrorKind, Result};
use qnet_core::io_err;

fn io_error(code: ErrorCode, path: &str, err: io::Error) -> Error {
    Error::new(ErrorKind::Io, code, Some(format!("{path}: {err}")))
}

#[cfg(unix)]
fn is_permitted(file_type: &FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    file_type.is_file() || file_type.is_fifo() || file_type.is_socket()
}

#[cfg(not(unix))]
fn is_permitted(file_type: &FileType) -> bool {
    file_type.is_file()
}

/// Reads the whole input eagerly.  `-` reads standard input, which must
/// not be an interactive terminal.  Files must be regular files, pipes
/// or sockets.
pub(crate) fn read_input(path: &str) -> Result<Vec<u8>> {
    let mut contents = vec![];
    if path == "-" {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            return io_err!(InputIsTerminal, "standard input is a terminal".to_owned());
        }
        stdin
            .lock()
            .read_to_end(&mut contents)
            .map_err(|err| io_error(ErrorCode::CannotRead, path, err))?;
        return Ok(contents);
    }

    let mut file = File::open(path).map_err(|err| io_error(ErrorCode::CannotOpen, path, err))?;
    let metadata = file
        .metadata()
        .map_err(|err| io_error(ErrorCode::CannotRead, path, err))?;
    if !is_permitted(&metadata.file_type()) {
        return io_err!(
            NotAllowed,
            format!("{path}: not a regular file, pipe or socket")
        );
    }
    if file.is_terminal() {
        return io_err!(InputIsTerminal, format!("{path}: input is a terminal"));
    }
    file.read_to_end(&mut contents)
        .map_err(|err| io_error(ErrorCode::CannotRead, path, err))?;
    Ok(contents)
}

#[test]
fn test_read_regular_file() {
    use std::io::Write;

    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(b"<model/>").unwrap();
    let path = f.path().to_str().unwrap().to_owned();
    assert_eq!(b"<model/>".to_vec(), read_input(&path).unwrap());
}

#[test]
fn test_rejects_directory_and_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_str().unwrap().to_owned();
    let err = read_input(&path).unwrap_err();
    assert_eq!(ErrorCode::NotAllowed, err.code);
    assert_eq!(ErrorKind::Io, err.kind);

    let missing = dir.path().join("missing.jmva");
    let err = read_input(missing.to_str().unwrap()).unwrap_err();
    assert_eq!(ErrorCode::CannotOpen, err.code);
}

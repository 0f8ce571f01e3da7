// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

fn read_between(file: &mut File, start: u64, end: u64) -> io::Result<String> {
    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::new();
    file.take(end.saturating_sub(start)).read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read part of a log file.
///
/// A negative `offset` returns the last `|offset|` bytes. Otherwise `length`
/// bytes are read from `offset`, or everything up to the end when `length`
/// is zero.
pub fn read_range(path: &Path, offset: i64, length: i64) -> io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let (start, end) = if offset < 0 {
        (size.saturating_sub(offset.unsigned_abs()), size)
    } else {
        let start = offset.unsigned_abs().min(size);
        let end = if length <= 0 {
            size
        } else {
            start.saturating_add(length.unsigned_abs()).min(size)
        };
        (start, end)
    };
    read_between(&mut file, start, end)
}

/// Read at most `length` trailing bytes starting no earlier than `offset`.
///
/// Returns the data, the offset to resume from (the file size) and whether
/// bytes between `offset` and the returned window were skipped.
pub fn tail_range(path: &Path, offset: i64, length: i64) -> io::Result<(String, u64, bool)> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let length = length.max(0).unsigned_abs();
    let mut start = offset.max(0).unsigned_abs().min(size);
    let mut overflow = false;
    if size - start > length {
        overflow = true;
        start = size - length;
    }
    let data = read_between(&mut file, start, size)?;
    Ok((data, size, overflow))
}

use std::fs::File;
use std::io::Write;

use phaselock_config::{WavelengthRow, load_wavelength_csv, wavelengths_from_rows};
use rstest::rstest;
use tempfile::tempdir;

fn write_csv(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wavelengths.csv");
    let mut f = File::create(&path).unwrap();
    f.write_all(body.as_bytes()).unwrap();
    (dir, path)
}

#[rstest]
fn loads_ascending_axis() {
    let (_dir, path) = write_csv("pixel,wavelength_nm\n0,780.0\n1,780.5\n2,781.0\n");
    let w = load_wavelength_csv(&path).unwrap();
    assert_eq!(w, vec![780.0, 780.5, 781.0]);
}

#[rstest]
fn loads_descending_axis_with_whitespace() {
    let (_dir, path) = write_csv("pixel , wavelength_nm\n0, 820.0\n1, 819.0\n");
    let w = load_wavelength_csv(&path).unwrap();
    assert_eq!(w, vec![820.0, 819.0]);
}

#[rstest]
fn rejects_wrong_headers() {
    let (_dir, path) = write_csv("index,nm\n0,780.0\n1,781.0\n");
    let err = load_wavelength_csv(&path).unwrap_err();
    assert!(err.to_string().contains("pixel,wavelength_nm"));
}

#[rstest]
fn rejects_bad_row() {
    let (_dir, path) = write_csv("pixel,wavelength_nm\n0,780.0\n1,abc\n");
    let err = load_wavelength_csv(&path).unwrap_err();
    assert!(err.to_string().contains("invalid CSV row 3"));
}

#[rstest]
fn rejects_missing_file() {
    let dir = tempdir().unwrap();
    let err = load_wavelength_csv(&dir.path().join("nope.csv")).unwrap_err();
    assert!(err.to_string().contains("open wavelength CSV"));
}

#[rstest]
#[case(&[(0, 780.0)], "at least two rows")]
#[case(&[(0, 780.0), (2, 781.0)], "contiguous")]
#[case(&[(0, 780.0), (1, 780.0)], "duplicate")]
#[case(&[(0, 780.0), (1, 781.0), (2, 780.5)], "strictly monotonic")]
#[case(&[(0, 780.0), (1, f64::NAN)], "non-finite")]
fn rejects_invalid_rows(#[case] rows: &[(usize, f64)], #[case] needle: &str) {
    let rows: Vec<WavelengthRow> = rows
        .iter()
        .map(|&(pixel, wavelength_nm)| WavelengthRow {
            pixel,
            wavelength_nm,
        })
        .collect();
    let err = wavelengths_from_rows(&rows).unwrap_err();
    assert!(err.to_string().contains(needle), "{err}");
}

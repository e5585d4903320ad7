//! End-to-end scenarios driving the facade over a real memory-mapped image
//! file, including a close/reopen round trip and nested directories.

use fatsim::{FileInfo, Filesystem, Geometry, MmapBlockDevice};

fn image_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

#[test]
fn format_then_create_and_read_back_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = image_path(&dir, "image.bin");
    let geo = Geometry::default();

    let device = MmapBlockDevice::open(&path, geo).unwrap();
    let fs = Filesystem::new(device, geo.buffer_capacity);
    fs.format().unwrap();

    fs.create_file("/notes.txt", b"").unwrap();
    fs.write_file("/notes.txt", b"remember the milk").unwrap();

    assert_eq!(fs.read_file("/notes.txt").unwrap(), b"remember the milk");
    fs.shutdown().unwrap();
}

#[test]
fn data_and_nested_directories_persist_across_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = image_path(&dir, "image.bin");
    let geo = Geometry::default();

    {
        let device = MmapBlockDevice::open(&path, geo).unwrap();
        let fs = Filesystem::new(device, geo.buffer_capacity);
        fs.format().unwrap();
        fs.create_directory("/data").unwrap();
        fs.create_file("/data/report.csv", b"").unwrap();
        fs.write_file("/data/report.csv", &vec![b'x'; 500]).unwrap();
        fs.shutdown().unwrap();
    }

    {
        let device = MmapBlockDevice::open(&path, geo).unwrap();
        let fs = Filesystem::new(device, geo.buffer_capacity);
        let info = fs.get_file_info("/data/report.csv").unwrap();
        assert_eq!(info.size, 500);
        assert_eq!(fs.read_file("/data/report.csv").unwrap(), vec![b'x'; 500]);

        let dir_info = fs.get_file_info("/data").unwrap();
        assert!(dir_info.is_directory);
        fs.shutdown().unwrap();
    }
}

#[test]
fn chain_extends_then_truncates_and_frees_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = image_path(&dir, "image.bin");
    let geo = Geometry::default();
    let device = MmapBlockDevice::open(&path, geo).unwrap();
    let fs = Filesystem::new(device, geo.buffer_capacity);
    fs.format().unwrap();

    fs.create_file("/growable.bin", b"").unwrap();
    let info_before = fs.get_system_info().unwrap();

    fs.write_file("/growable.bin", &vec![1u8; 10 * geo.block_size as usize])
        .unwrap();
    let info_grown = fs.get_system_info().unwrap();
    assert!(info_grown.free_blocks < info_before.free_blocks);

    fs.write_file("/growable.bin", &vec![2u8; 2]).unwrap();
    let info_shrunk = fs.get_system_info().unwrap();
    assert!(info_shrunk.free_blocks > info_grown.free_blocks);
    assert_eq!(fs.read_file("/growable.bin").unwrap(), vec![2u8; 2]);

    fs.shutdown().unwrap();
}

#[test]
fn deleting_a_nonexistent_path_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = image_path(&dir, "image.bin");
    let geo = Geometry::default();
    let device = MmapBlockDevice::open(&path, geo).unwrap();
    let fs = Filesystem::new(device, geo.buffer_capacity);
    fs.format().unwrap();

    let err = fs.delete_file("/ghost.txt").unwrap_err();
    assert!(matches!(err, fatsim::FsError::NotFound(_)));
}

#[test]
fn listing_reflects_creates_and_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let path = image_path(&dir, "image.bin");
    let geo = Geometry::default();
    let device = MmapBlockDevice::open(&path, geo).unwrap();
    let fs = Filesystem::new(device, geo.buffer_capacity);
    fs.format().unwrap();

    fs.create_file("/one.txt", b"").unwrap();
    fs.create_file("/two.txt", b"").unwrap();
    let names: Vec<String> = fs
        .list_directory("/")
        .unwrap()
        .into_iter()
        .map(|e: FileInfo| e.name)
        .collect();
    assert!(names.contains(&"one.txt".to_string()));
    assert!(names.contains(&"two.txt".to_string()));

    fs.delete_file("/one.txt").unwrap();
    let names: Vec<String> = fs
        .list_directory("/")
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert!(!names.contains(&"one.txt".to_string()));
    assert!(names.contains(&"two.txt".to_string()));
}

#[test]
fn deep_nesting_resolves_and_rejects_non_directory_ancestors() {
    let dir = tempfile::tempdir().unwrap();
    let path = image_path(&dir, "image.bin");
    let geo = Geometry::default();
    let device = MmapBlockDevice::open(&path, geo).unwrap();
    let fs = Filesystem::new(device, geo.buffer_capacity);
    fs.format().unwrap();

    fs.create_directory("/a").unwrap();
    fs.create_directory("/a/b").unwrap();
    fs.create_file("/a/b/leaf.txt", b"deep").unwrap();
    assert_eq!(fs.read_file("/a/b/leaf.txt").unwrap(), b"deep");

    let err = fs.create_file("/a/b/leaf.txt/oops.txt", b"").unwrap_err();
    assert!(matches!(err, fatsim::FsError::NotADirectory(_)));
}

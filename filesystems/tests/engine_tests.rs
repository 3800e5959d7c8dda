// End-to-end tests over freshly formatted FAT32 images: every public verb,
// plus the consistency sweep after each scenario.

use fatmod_core::test_utils::create_image_file;
use fatmod_core::{FatError, OpenMode};
use fatmod_filesystems::{format_volume, validate, Fat32Volume, FormatOptions};
use tempfile::NamedTempFile;

/// A 1 MiB volume: 512-byte sectors, one sector per cluster, two FATs.
fn fresh_volume() -> (NamedTempFile, Fat32Volume) {
    fresh_volume_with(2048)
}

fn fresh_volume_with(total_sectors: u32) -> (NamedTempFile, Fat32Volume) {
    let _ = env_logger::builder().is_test(true).try_init();
    let file = create_image_file(total_sectors as u64 * 512).expect("temp image");
    let opts = FormatOptions {
        total_sectors,
        ..FormatOptions::default()
    };
    format_volume(file.path(), &opts).expect("format");
    let volume = Fat32Volume::mount(file.path()).expect("mount");
    (file, volume)
}

fn assert_clean(volume: &Fat32Volume) {
    let report = validate(volume).expect("validation sweep");
    assert!(
        report.is_clean(),
        "invariant violations: {:?}",
        report.errors
    );
}

#[test]
fn fresh_volume_mounts_clean() {
    let (_file, volume) = fresh_volume();
    assert_eq!(volume.current_directory_name(), "/");
    assert!(volume.list("/").unwrap().is_empty());
    assert!(volume.free_cluster_count() > 0);
    assert_clean(&volume);
}

#[test]
fn summary_reports_geometry_and_free_space() {
    let (_file, volume) = fresh_volume();
    let summary = volume.summary();
    assert_eq!(summary.bytes_per_sector, 512);
    assert_eq!(summary.sectors_per_cluster, 1);
    assert_eq!(summary.total_sectors, 2048);
    assert_eq!(summary.num_fats, 2);
    assert_eq!(summary.free_sectors, volume.free_cluster_count());
}

#[test]
fn mount_of_missing_image_fails() {
    let err = Fat32Volume::mount("/nonexistent/volume.img").unwrap_err();
    assert!(matches!(err, FatError::Mount { .. }));
}

#[test]
fn mount_of_garbage_image_fails() {
    let file = create_image_file(1024 * 1024).unwrap();
    let err = Fat32Volume::mount(file.path()).unwrap_err();
    assert!(matches!(err, FatError::Corrupt(_)));
}

#[test]
fn mkdir_cd_ls_round_trip() {
    let (_file, mut volume) = fresh_volume();

    volume.mkdir("foo").unwrap();
    volume.cd("foo").unwrap();
    assert_eq!(volume.current_directory_name(), "foo");

    let names = volume.list("foo").unwrap();
    assert_eq!(names, vec![".", ".."]);

    volume.cd("..").unwrap();
    assert_eq!(volume.current_directory_name(), "/");
    assert!(volume.list("/").unwrap().contains(&"foo".to_string()));
    assert_clean(&volume);
}

#[test]
fn new_directory_has_dot_entries_pointing_home() {
    let (_file, mut volume) = fresh_volume();
    let root = volume.bpb().root_cluster;

    volume.mkdir("sub").unwrap();
    let sub = volume.find_entry("sub", root).unwrap().unwrap();
    assert!(sub.is_directory());

    let entries = volume.directory_entries(sub.cluster).unwrap();
    assert_eq!(entries[0].name, ".");
    assert_eq!(entries[0].cluster, sub.cluster);
    assert_eq!(entries[1].name, "..");
    assert_eq!(entries[1].cluster, root);
    assert_clean(&volume);
}

#[test]
fn create_write_read_and_allocated_size() {
    let (_file, mut volume) = fresh_volume();

    volume.create("a.txt").unwrap();
    volume.open("a.txt", OpenMode::ReadWrite).unwrap();
    volume.write("a.txt", 0, b"hello").unwrap();

    assert_eq!(volume.read("a.txt", 0, 5).unwrap(), b"hello");
    assert_eq!(volume.allocated_size("a.txt").unwrap(), 512);
    assert_clean(&volume);
}

#[test]
fn write_extends_across_clusters() {
    let (_file, mut volume) = fresh_volume();
    let data: Vec<u8> = (0..513u32).map(|i| (i % 251) as u8).collect();

    volume.create("big").unwrap();
    volume.open("big", OpenMode::Write).unwrap();
    volume.write("big", 0, &data).unwrap();
    assert_eq!(volume.allocated_size("big").unwrap(), 1024);

    // Write-only handles cannot read back.
    assert!(matches!(
        volume.read("big", 0, 513),
        Err(FatError::WrongMode { .. })
    ));

    volume.close("big").unwrap();
    volume.open("big", OpenMode::Read).unwrap();
    assert_eq!(volume.read("big", 0, 513).unwrap(), data);
    assert_clean(&volume);
}

#[test]
fn write_at_offset_spans_cluster_boundary() {
    let (_file, mut volume) = fresh_volume();
    let data = vec![0xAB; 100];

    volume.create("span").unwrap();
    volume.open("span", OpenMode::ReadWrite).unwrap();
    volume.write("span", 500, &data).unwrap();

    assert_eq!(volume.allocated_size("span").unwrap(), 1024);
    assert_eq!(volume.read("span", 500, 100).unwrap(), data);
    assert_clean(&volume);
}

#[test]
fn read_clamps_to_file_size_and_rejects_bad_start() {
    let (_file, mut volume) = fresh_volume();

    volume.create("small").unwrap();
    volume.open("small", OpenMode::ReadWrite).unwrap();
    volume.write("small", 0, b"abc").unwrap();

    assert_eq!(volume.read("small", 0, 1000).unwrap(), b"abc");
    assert_eq!(volume.read("small", 2, 1000).unwrap(), b"c");
    assert!(matches!(
        volume.read("small", 4, 1),
        Err(FatError::OutOfRange { .. })
    ));
}

#[test]
fn create_then_remove_restores_free_count() {
    let (_file, mut volume) = fresh_volume();
    let before = volume.free_cluster_count();

    volume.create("x").unwrap();
    assert_eq!(volume.free_cluster_count(), before - 1);

    volume.remove("x").unwrap();
    assert_eq!(volume.free_cluster_count(), before);
    assert!(!volume.list("/").unwrap().contains(&"x".to_string()));
    assert_clean(&volume);
}

#[test]
fn undelete_revives_first_cluster() {
    let (_file, mut volume) = fresh_volume();

    volume.create("y").unwrap();
    volume.open("y", OpenMode::ReadWrite).unwrap();
    volume.write("y", 0, b"precious").unwrap();
    let root = volume.bpb().root_cluster;
    let y_cluster = volume.find_entry("y", root).unwrap().unwrap().cluster;

    volume.remove("y").unwrap();
    assert!(!volume.list("/").unwrap().contains(&"y".to_string()));
    let free_after_rm = volume.free_cluster_count();

    assert_eq!(volume.undelete().unwrap(), 1);
    let revived = volume.find_entry("undel.1", root).unwrap().unwrap();
    assert_eq!(revived.cluster, y_cluster);
    assert!(revived.size <= 512);
    assert!(volume.fat_entry(y_cluster).unwrap() >= 0x0FFF_FFF8);
    assert_eq!(volume.free_cluster_count(), free_after_rm - 1);

    // The first cluster's content survives deletion and recovery.
    volume.open("undel.1", OpenMode::Read).unwrap();
    assert_eq!(volume.read("undel.1", 0, 8).unwrap(), b"precious");
    assert_clean(&volume);
}

#[test]
fn undelete_names_follow_scan_order() {
    let (_file, mut volume) = fresh_volume();
    let root = volume.bpb().root_cluster;

    volume.create("one").unwrap();
    volume.create("two").unwrap();
    let one_cluster = volume.find_entry("one", root).unwrap().unwrap().cluster;
    let two_cluster = volume.find_entry("two", root).unwrap().unwrap().cluster;

    volume.remove("one").unwrap();
    volume.remove("two").unwrap();
    assert_eq!(volume.undelete().unwrap(), 2);

    // Slots are scanned from the highest offset down, so the later record
    // gets recovered first.
    let first = volume.find_entry("undel.1", root).unwrap().unwrap();
    let second = volume.find_entry("undel.2", root).unwrap().unwrap();
    assert_eq!(first.cluster, two_cluster);
    assert_eq!(second.cluster, one_cluster);
    assert_clean(&volume);
}

#[test]
fn open_state_machine_errors() {
    let (_file, mut volume) = fresh_volume();
    volume.create("f").unwrap();

    assert!(matches!(
        volume.read("f", 0, 1),
        Err(FatError::NotOpen(_))
    ));

    volume.open("f", OpenMode::Read).unwrap();
    assert!(matches!(
        volume.open("f", OpenMode::Write),
        Err(FatError::AlreadyOpen(_))
    ));
    assert!(matches!(
        volume.write("f", 0, b"x"),
        Err(FatError::WrongMode { .. })
    ));

    volume.close("f").unwrap();
    assert!(matches!(volume.close("f"), Err(FatError::NotOpen(_))));
    assert!(matches!(
        volume.open("missing", OpenMode::Read),
        Err(FatError::NotFound(_))
    ));
}

#[test]
fn kind_mismatches_are_rejected() {
    let (_file, mut volume) = fresh_volume();
    volume.create("file").unwrap();
    volume.mkdir("dir").unwrap();

    assert!(matches!(volume.cd("file"), Err(FatError::NotADirectory(_))));
    assert!(matches!(volume.list("file"), Err(FatError::NotADirectory(_))));
    assert!(matches!(volume.remove("dir"), Err(FatError::NotAFile(_))));
    assert!(matches!(
        volume.open("dir", OpenMode::Read),
        Err(FatError::NotAFile(_))
    ));
    assert!(matches!(volume.rmdir("file"), Err(FatError::NotADirectory(_))));
}

#[test]
fn mkdir_of_existing_name_leaves_volume_untouched() {
    let (_file, mut volume) = fresh_volume();
    volume.mkdir("dup").unwrap();
    let free = volume.free_cluster_count();

    assert!(matches!(
        volume.mkdir("dup"),
        Err(FatError::AlreadyExists(_))
    ));
    assert!(matches!(
        volume.create("dup"),
        Err(FatError::AlreadyExists(_))
    ));
    assert_eq!(volume.free_cluster_count(), free);
    assert_clean(&volume);
}

#[test]
fn rmdir_requires_empty_directory() {
    let (_file, mut volume) = fresh_volume();
    volume.mkdir("parent").unwrap();
    volume.cd("parent").unwrap();
    volume.create("child").unwrap();
    volume.cd("..").unwrap();

    let free = volume.free_cluster_count();
    assert!(matches!(volume.rmdir("parent"), Err(FatError::NotEmpty(_))));
    assert_eq!(volume.free_cluster_count(), free);
    assert_eq!(volume.allocated_size("parent").unwrap(), 512);

    volume.cd("parent").unwrap();
    volume.remove("child").unwrap();
    volume.cd("..").unwrap();
    volume.rmdir("parent").unwrap();
    assert!(!volume.list("/").unwrap().contains(&"parent".to_string()));
    assert_clean(&volume);
}

#[test]
fn rmdir_refuses_dot_names_and_root() {
    let (_file, mut volume) = fresh_volume();
    assert!(matches!(volume.rmdir("."), Err(FatError::InvalidName(_))));
    assert!(matches!(volume.rmdir(".."), Err(FatError::InvalidName(_))));
    assert!(matches!(volume.rmdir("/"), Err(FatError::InvalidName(_))));
}

#[test]
fn insufficient_space_is_checked_before_mutation() {
    let (_file, mut volume) = fresh_volume_with(128);

    volume.create("hog").unwrap();
    volume.open("hog", OpenMode::Write).unwrap();

    let free = volume.free_cluster_count();
    let too_big = vec![0u8; ((free + 2) * 512) as usize];
    assert!(matches!(
        volume.write("hog", 0, &too_big),
        Err(FatError::InsufficientSpace)
    ));
    assert_eq!(volume.free_cluster_count(), free);
    assert_eq!(volume.allocated_size("hog").unwrap(), 512);
    assert_clean(&volume);
}

#[test]
fn directory_grows_when_its_slots_run_out() {
    let (_file, mut volume) = fresh_volume();

    // One 512-byte cluster holds 16 records; the 17th forces the root chain
    // to grow.
    for i in 0..17 {
        volume.create(&format!("f{i}")).unwrap();
    }
    assert_eq!(volume.allocated_size("/").unwrap(), 1024);

    let names = volume.list("/").unwrap();
    for i in 0..17 {
        assert!(names.contains(&format!("f{i}")));
    }
    assert_clean(&volume);
}

#[test]
fn free_hint_tracks_allocation_and_release() {
    let (_file, mut volume) = fresh_volume();
    let hint = volume.first_free_cluster_hint();

    volume.create("a").unwrap();
    assert_eq!(volume.first_free_cluster_hint(), hint + 1);
    volume.create("b").unwrap();
    assert_eq!(volume.first_free_cluster_hint(), hint + 2);

    // Freeing a lower cluster pulls the hint back down, and the next
    // allocation picks that cluster up again.
    volume.remove("a").unwrap();
    assert_eq!(volume.first_free_cluster_hint(), hint);

    volume.create("c").unwrap();
    let root = volume.bpb().root_cluster;
    let c = volume.find_entry("c", root).unwrap().unwrap();
    assert_eq!(c.cluster, hint);
    assert_clean(&volume);
}

#[test]
fn deleted_slots_are_reused() {
    let (_file, mut volume) = fresh_volume();

    volume.create("first").unwrap();
    volume.remove("first").unwrap();
    volume.create("second").unwrap();

    // The record goes into the freed slot, so the directory stays one
    // cluster long.
    assert_eq!(volume.allocated_size("/").unwrap(), 512);
    assert_clean(&volume);
}

#[test]
fn names_with_slashes_are_rejected() {
    let (_file, mut volume) = fresh_volume();
    assert!(matches!(
        volume.create("a/b"),
        Err(FatError::InvalidName(_))
    ));
    assert!(matches!(volume.cd("a/b"), Err(FatError::InvalidName(_))));
    assert!(matches!(
        volume.remove("a/b"),
        Err(FatError::InvalidName(_))
    ));
    // The bare slash is the root and stays addressable.
    assert!(volume.list("/").is_ok());
}

#[test]
fn nested_directories_resolve_dot_dot_correctly() {
    let (_file, mut volume) = fresh_volume();

    volume.mkdir("outer").unwrap();
    volume.cd("outer").unwrap();
    volume.mkdir("inner").unwrap();
    volume.cd("inner").unwrap();
    volume.create("deep.txt").unwrap();

    volume.cd("..").unwrap();
    assert!(volume.list(".").unwrap().contains(&"inner".to_string()));

    volume.cd("..").unwrap();
    assert_eq!(volume.current_directory_name(), "/");
    assert!(volume.list("/").unwrap().contains(&"outer".to_string()));
    assert_clean(&volume);
}

#[test]
fn write_persists_across_remount() {
    let _ = env_logger::builder().is_test(true).try_init();
    let file = create_image_file(2048 * 512).unwrap();
    format_volume(
        file.path(),
        &FormatOptions {
            total_sectors: 2048,
            ..FormatOptions::default()
        },
    )
    .unwrap();

    {
        let mut volume = Fat32Volume::mount(file.path()).unwrap();
        volume.create("keep.txt").unwrap();
        volume.open("keep.txt", OpenMode::Write).unwrap();
        volume.write("keep.txt", 0, b"durable").unwrap();
        volume.flush().unwrap();
    }

    let mut volume = Fat32Volume::mount(file.path()).unwrap();
    assert!(volume.list("/").unwrap().contains(&"keep.txt".to_string()));
    volume.open("keep.txt", OpenMode::Read).unwrap();
    assert_eq!(volume.read("keep.txt", 0, 7).unwrap(), b"durable");
    assert_clean(&volume);
}

#[test]
fn operation_sequences_keep_invariants() {
    let (_file, mut volume) = fresh_volume();

    volume.mkdir("work").unwrap();
    volume.cd("work").unwrap();
    for i in 0..5 {
        volume.create(&format!("log.{i}")).unwrap();
    }
    volume.open("log.0", OpenMode::ReadWrite).unwrap();
    volume.write("log.0", 0, &vec![0x5A; 2000]).unwrap();
    volume.remove("log.3").unwrap();
    volume.undelete().unwrap();
    volume.cd("/").unwrap();
    volume.create("tail").unwrap();
    volume.remove("tail").unwrap();

    assert_clean(&volume);
}

//! Integration tests exercising the `Filesystem` API directly, matching the
//! scenarios and boundary behaviors called out in `SPEC_FULL.md` §8.

use simdisk::error::{Error, ErrorCode};
use simdisk::layout::BLOCK_SIZE;
use simdisk::wire::Opt;
use simdisk::Filesystem;
use tempfile::NamedTempFile;

fn fresh() -> Filesystem {
    let tmp = NamedTempFile::new().unwrap();
    Filesystem::format(tmp.path()).unwrap()
}

#[test]
fn fresh_format_lists_the_canonical_subtree_and_user_log() {
    let mut fs = fresh();
    let root = fs.root_entry();
    assert_eq!(
        fs.list(&root, false, false).unwrap(),
        "home  lost+found  proc  root  usr"
    );
    let user_log = fs.resolve_from(&root, "/usr/user.log").unwrap();
    let content = String::from_utf8(fs.read_whole(&user_log).unwrap()).unwrap();
    assert_eq!(content, "username    password\n    root        root\n");
}

#[test]
fn permission_gate_blocks_other_users_from_root_home() {
    let mut fs = fresh();
    fs.useradd("bob", "bob").unwrap();
    let root_home = fs.resolve_from(&fs.root_entry(), "/root").unwrap();
    let inode = fs.inode_of(root_home.inode_id).unwrap();
    assert!(matches!(
        fs.check_perm(&inode, "bob", simdisk::fs::EXEC),
        Err(Error::PermissionDenied)
    ));
}

#[test]
fn nonempty_rmdir_requires_two_phase_confirmation() {
    let mut fs = fresh();
    let root = fs.root_entry();
    fs.make_directory(&root, "a", "root").unwrap();
    let a = fs.resolve_from(&root, "a").unwrap();
    fs.create_file(&a, "x", "root").unwrap();

    assert!(matches!(
        fs.remove_directory(&root, "a", Opt::None),
        Err(Error::WaitRequest)
    ));
    fs.remove_directory(&root, "a", Opt::Response).unwrap();
    assert!(fs.child(&root, "a").unwrap().is_none());
}

#[test]
fn indirect_growth_round_trips_300_blocks_of_payload() {
    let mut fs = fresh();
    let root = fs.root_entry();
    fs.create_file(&root, "f", "root").unwrap();
    let f = fs.resolve_from(&root, "f").unwrap();

    let payload = vec![0x5au8; 300 * BLOCK_SIZE];
    fs.write_whole(&f, &payload, "root").unwrap();
    assert_eq!(fs.read_whole(&f).unwrap(), payload);

    let inode = fs.inode_of(f.inode_id).unwrap();
    for slot in 0..6 {
        assert_ne!(inode.i_block[slot], simdisk::layout::SENTINEL);
    }
    assert_ne!(inode.i_block[6], simdisk::layout::SENTINEL);
    // 300 blocks exceeds the 6 + 256 single-indirect ceiling, so the
    // double-indirect slot is in use too.
    assert_ne!(inode.i_block[7], simdisk::layout::SENTINEL);
}

#[test]
fn block_bitmap_population_is_monotone_across_create_write_delete() {
    let mut fs = fresh();
    let root = fs.root_entry();
    let before = fs.block_bitmap_count();

    fs.make_directory(&root, "t", "root").unwrap();
    let t = fs.resolve_from(&root, "t").unwrap();
    fs.create_file(&t, "f", "root").unwrap();
    let f = fs.resolve_from(&t, "f").unwrap();
    fs.write_whole(&f, b"x", "root").unwrap();
    fs.remove_file(&t, "f").unwrap();
    fs.remove_directory(&root, "t", Opt::None).unwrap();

    assert_eq!(fs.block_bitmap_count(), before);
}

#[test]
fn name_length_boundary_exactly_24_succeeds_25_fails() {
    let mut fs = fresh();
    let root = fs.root_entry();
    let ok_name = "n".repeat(24);
    fs.create_file(&root, &ok_name, "root").unwrap();
    let too_long = "n".repeat(25);
    assert!(matches!(
        fs.create_file(&root, &too_long, "root"),
        Err(Error::Exceeded)
    ));
}

#[test]
fn writing_exactly_six_blocks_uses_only_direct_pointers() {
    let mut fs = fresh();
    let root = fs.root_entry();
    fs.create_file(&root, "f", "root").unwrap();
    let f = fs.resolve_from(&root, "f").unwrap();
    fs.write_whole(&f, &vec![1u8; 6 * BLOCK_SIZE], "root").unwrap();
    let inode = fs.inode_of(f.inode_id).unwrap();
    assert_eq!(inode.i_block[6], simdisk::layout::SENTINEL);
    assert_eq!(inode.i_block[7], simdisk::layout::SENTINEL);
}

#[test]
fn writing_one_byte_past_six_blocks_allocates_the_single_indirect_slot() {
    let mut fs = fresh();
    let root = fs.root_entry();
    fs.create_file(&root, "f", "root").unwrap();
    let f = fs.resolve_from(&root, "f").unwrap();
    fs.write_whole(&f, &vec![1u8; 6 * BLOCK_SIZE + 1], "root").unwrap();
    let inode = fs.inode_of(f.inode_id).unwrap();
    assert_ne!(inode.i_block[6], simdisk::layout::SENTINEL);
    assert_eq!(inode.i_block[7], simdisk::layout::SENTINEL);
}

#[test]
fn format_then_load_round_trips_tree_and_population() {
    let tmp = NamedTempFile::new().unwrap();
    let mut fs = Filesystem::format(tmp.path()).unwrap();
    fs.make_directory(&fs.root_entry(), "extra", "root").unwrap();
    let before_blocks = fs.block_bitmap_count();
    let before_inodes = fs.inode_bitmap_count();
    drop(fs);

    let mut reloaded = Filesystem::load(tmp.path()).unwrap();
    assert_eq!(reloaded.block_bitmap_count(), before_blocks);
    assert_eq!(reloaded.inode_bitmap_count(), before_inodes);
    let root = reloaded.root_entry();
    assert!(reloaded.resolve_from(&root, "extra").is_ok());
    assert!(reloaded.authenticate("root", "root"));
}

#[test]
fn split_path_and_name_matches_the_spec_table() {
    assert_eq!(
        Filesystem::split_path_and_name(""),
        ("..".to_string(), ".".to_string())
    );
    assert_eq!(
        Filesystem::split_path_and_name("/"),
        ("/".to_string(), ".".to_string())
    );
    assert_eq!(
        Filesystem::split_path_and_name("/a/b"),
        ("/a".to_string(), "b".to_string())
    );
    assert_eq!(
        Filesystem::split_path_and_name("name"),
        (".".to_string(), "name".to_string())
    );
}

#[test]
fn checking_a_healthy_image_reports_functioning_properly() {
    let fs = fresh();
    assert_eq!(fs.check(), "simdisk is functioning properly");
    // keep `ErrorCode` import alive for the crate's public surface check
    let _ = ErrorCode::Success;
}

//! 间接块遍历集成测试

mod common;

use common::{build_fs, MemDevice};
use extmap_core::indirect::COUNT_IND;
use extmap_core::{block_iterate, tree_init, ErrorKind, Filesystem, IterateFlags, VisitFlags};

/// 向一个块写入小端指针数组
fn write_ptr_block(fs: &mut Filesystem<MemDevice>, block: u64, ptrs: &[(usize, u32)]) {
    let mut buf = vec![0u8; 1024];
    for &(i, v) in ptrs {
        buf[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
    }
    fs.block_device_mut().write_block(block, &buf).unwrap();
}

#[test]
fn test_direct_then_indirect_visit_order() {
    // 块大小 1024：每个间接块 256 个指针。12 个直接块映射到
    // 100..111，间接块带 50 条映射。访问顺序：12 次直接块、
    // 1 次间接块标记、50 次间接叶子。
    let mut fs = build_fs(1024);
    let ino = 5;

    let mut inode = fs.read_inode(ino).unwrap();
    for i in 0..12 {
        inode.blocks[i] = 100 + i as u32;
    }
    inode.blocks[12] = 200;
    fs.write_inode(ino, &inode).unwrap();

    let ptrs: Vec<(usize, u32)> = (0..50).map(|i| (i, 300 + i as u32)).collect();
    write_ptr_block(&mut fs, 200, &ptrs);

    let mut calls: Vec<(i64, u64)> = Vec::new();
    block_iterate(&mut fs, ino, IterateFlags::empty(), &mut |blk, count| {
        calls.push((count, *blk));
        VisitFlags::empty()
    })
    .unwrap();

    assert_eq!(calls.len(), 63);
    for i in 0..12 {
        assert_eq!(calls[i], (i as i64, 100 + i as u64), "direct slot {}", i);
    }
    assert_eq!(calls[12], (COUNT_IND, 200));
    for i in 0..50 {
        assert_eq!(
            calls[13 + i],
            (12 + i as i64, 300 + i as u64),
            "indirect leaf {}",
            i
        );
    }
}

#[test]
fn test_hole_accounting_across_absent_subtrees() {
    // 只有二级间接的第二个子树里有一条映射。直接块 12 个 + 缺失的
    // 一级间接 256 个 + 缺失的第一个子树 256 个，数据块的逻辑计数
    // 必须是 524，尽管缺失的子树从未被读过。
    let mut fs = build_fs(1024);
    let ino = 6;

    let mut inode = fs.read_inode(ino).unwrap();
    inode.blocks[13] = 210;
    fs.write_inode(ino, &inode).unwrap();

    write_ptr_block(&mut fs, 210, &[(1, 211)]);
    write_ptr_block(&mut fs, 211, &[(0, 400)]);

    let mut calls: Vec<(i64, u64)> = Vec::new();
    block_iterate(&mut fs, ino, IterateFlags::DATA_ONLY, &mut |blk, count| {
        calls.push((count, *blk));
        VisitFlags::empty()
    })
    .unwrap();

    assert_eq!(calls, vec![(524, 400)]);
}

#[test]
fn test_post_order_visits_metadata_last() {
    let mut fs = build_fs(1024);
    let ino = 7;

    let mut inode = fs.read_inode(ino).unwrap();
    inode.blocks[12] = 220;
    fs.write_inode(ino, &inode).unwrap();
    write_ptr_block(&mut fs, 220, &[(0, 500), (1, 501)]);

    let mut calls: Vec<(i64, u64)> = Vec::new();
    block_iterate(
        &mut fs,
        ino,
        IterateFlags::DEPTH_TRAVERSE,
        &mut |blk, count| {
            calls.push((count, *blk));
            VisitFlags::empty()
        },
    )
    .unwrap();

    // 先子块，后元数据块
    assert_eq!(calls, vec![(12, 500), (13, 501), (COUNT_IND, 220)]);
}

#[test]
fn test_visitor_remap_writes_back() {
    let mut fs = build_fs(1024);
    let ino = 8;

    let mut inode = fs.read_inode(ino).unwrap();
    inode.blocks[0] = 100;
    inode.blocks[12] = 230;
    fs.write_inode(ino, &inode).unwrap();
    write_ptr_block(&mut fs, 230, &[(0, 600)]);

    block_iterate(&mut fs, ino, IterateFlags::empty(), &mut |blk, count| {
        if count == 0 && *blk == 100 {
            *blk = 150;
            return VisitFlags::CHANGED;
        }
        if count == 12 && *blk == 600 {
            *blk = 650;
            return VisitFlags::CHANGED;
        }
        VisitFlags::empty()
    })
    .unwrap();

    // inode 顶层槽已写回
    let inode = fs.read_inode(ino).unwrap();
    assert_eq!(inode.blocks[0], 150);

    // 间接块内容已写回
    let mut buf = vec![0u8; 1024];
    fs.block_device_mut().read_block(230, &mut buf).unwrap();
    assert_eq!(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]), 650);
}

#[test]
fn test_read_only_iteration_rejects_mutation() {
    let mut fs = build_fs(1024);
    let ino = 8;

    let mut inode = fs.read_inode(ino).unwrap();
    inode.blocks[0] = 100;
    fs.write_inode(ino, &inode).unwrap();

    let err = block_iterate(&mut fs, ino, IterateFlags::READ_ONLY, &mut |blk, _| {
        *blk = 999;
        VisitFlags::CHANGED
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);

    // 没有任何东西被写回
    let inode = fs.read_inode(ino).unwrap();
    assert_eq!(inode.blocks[0], 100);
}

#[test]
fn test_abort_stops_iteration() {
    let mut fs = build_fs(1024);
    let ino = 5;

    let mut inode = fs.read_inode(ino).unwrap();
    for i in 0..12 {
        inode.blocks[i] = 100 + i as u32;
    }
    fs.write_inode(ino, &inode).unwrap();

    let mut calls = 0;
    block_iterate(&mut fs, ino, IterateFlags::empty(), &mut |_, _| {
        calls += 1;
        if calls == 3 {
            VisitFlags::ABORT
        } else {
            VisitFlags::empty()
        }
    })
    .unwrap();

    assert_eq!(calls, 3);
}

#[test]
fn test_holes_visited_with_flag() {
    let mut fs = build_fs(1024);
    let ino = 11;

    let mut inode = fs.read_inode(ino).unwrap();
    inode.blocks[3] = 100;
    fs.write_inode(ino, &inode).unwrap();

    // 只看 12 个直接槽（第 13 次调用是间接块的空洞，就此中止）
    let mut calls: Vec<(i64, u64)> = Vec::new();
    block_iterate(&mut fs, ino, IterateFlags::HOLE, &mut |blk, count| {
        if calls.len() == 12 {
            return VisitFlags::ABORT;
        }
        calls.push((count, *blk));
        VisitFlags::empty()
    })
    .unwrap();

    assert_eq!(calls.len(), 12);
    for i in 0..12 {
        let expect_blk = if i == 3 { 100 } else { 0 };
        assert_eq!(calls[i], (i as i64, expect_blk), "slot {}", i);
    }
}

#[test]
fn test_bad_indirect_pointers() {
    let mut fs = build_fs(1024);

    let ino = 9;
    let mut inode = fs.read_inode(ino).unwrap();
    inode.blocks[12] = 2000; // 超出 1024 块的设备
    fs.write_inode(ino, &inode).unwrap();
    let err = block_iterate(&mut fs, ino, IterateFlags::empty(), &mut |_, _| {
        VisitFlags::empty()
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadIndirectBlock);

    let ino = 10;
    let mut inode = fs.read_inode(ino).unwrap();
    inode.blocks[13] = 3000;
    fs.write_inode(ino, &inode).unwrap();
    let err = block_iterate(&mut fs, ino, IterateFlags::empty(), &mut |_, _| {
        VisitFlags::empty()
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDoubleIndirectBlock);
}

#[test]
fn test_extent_inode_rejected() {
    let mut fs = build_fs(1024);
    let ino = 12;
    tree_init(&mut fs, ino).unwrap();

    let err = block_iterate(&mut fs, ino, IterateFlags::empty(), &mut |_, _| {
        VisitFlags::empty()
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

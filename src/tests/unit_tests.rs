mod concurrent_map {
    use std::rc::Rc;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering::{Acquire, Release};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use futures::future::join_all;
    use sdd::Guard;
    use tokio::sync::Barrier as AsyncBarrier;

    use crate::{
        BucketArray, BucketStatus, ConcurrentMap, DefaultRedistributor, Error, Redistributor,
        Result,
    };

    static_assertions::assert_impl_all!(ConcurrentMap<String>: Send, Sync);
    static_assertions::assert_not_impl_any!(ConcurrentMap<Rc<String>>: Send, Sync);
    static_assertions::assert_not_impl_any!(ConcurrentMap<*const String>: Send, Sync);

    #[cfg_attr(miri, ignore)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn insert_async() {
        let num_tasks = 8;
        let workload_size = 10_000;
        let map: Arc<ConcurrentMap<usize>> = Arc::new(ConcurrentMap::new(16).unwrap());
        let barrier = Arc::new(AsyncBarrier::new(num_tasks));
        let mut tasks = Vec::with_capacity(num_tasks);
        for task_id in 0..num_tasks {
            let barrier_clone = barrier.clone();
            let map_clone = map.clone();
            tasks.push(tokio::task::spawn(async move {
                barrier_clone.wait().await;
                for i in (task_id..workload_size).step_by(num_tasks) {
                    assert_eq!(map_clone.put(format!("key-{i}"), i), Ok(true));
                }
            }));
        }
        for task in join_all(tasks).await {
            assert!(task.is_ok());
        }

        assert_eq!(map.len(), workload_size as u64);
        for i in 0..workload_size {
            assert_eq!(map.get(&format!("key-{i}")), Some(i));
        }
        assert_eq!(map.redistribution_faults(), 0);
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn insert_sync() {
        let num_threads = 8;
        let workload_size = 10_000;
        let map: Arc<ConcurrentMap<usize>> = Arc::new(ConcurrentMap::new(16).unwrap());
        let barrier = Arc::new(Barrier::new(num_threads));
        let mut threads = Vec::with_capacity(num_threads);
        for thread_id in 0..num_threads {
            let barrier_clone = barrier.clone();
            let map_clone = map.clone();
            threads.push(thread::spawn(move || {
                barrier_clone.wait();
                let start = thread_id * (workload_size / num_threads);
                let end = start + workload_size / num_threads;
                for i in start..end {
                    assert_eq!(map_clone.put(i.to_string(), i), Ok(true));
                }
            }));
        }
        for thread in threads {
            assert!(thread.join().is_ok());
        }

        assert_eq!(map.len(), workload_size as u64);
        for i in 0..workload_size {
            assert_eq!(map.get(&i.to_string()), Some(i));
        }
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn update_sync() {
        let num_threads = if cfg!(miri) { 2 } else { 8 };
        let num_keys = 64;
        let map: Arc<ConcurrentMap<usize>> = Arc::new(ConcurrentMap::new(4).unwrap());
        let barrier = Arc::new(Barrier::new(num_threads));
        let mut threads = Vec::with_capacity(num_threads);
        for thread_id in 0..num_threads {
            let barrier_clone = barrier.clone();
            let map_clone = map.clone();
            threads.push(thread::spawn(move || {
                barrier_clone.wait();
                let mut inserted = 0;
                for round in 0..16 {
                    for k in 0..num_keys {
                        if map_clone.put(k.to_string(), thread_id * 1000 + round).unwrap() {
                            inserted += 1;
                        }
                    }
                }
                inserted
            }));
        }
        let mut inserted = 0;
        for thread in threads {
            inserted += thread.join().unwrap();
        }

        assert_eq!(inserted, num_keys);
        assert_eq!(map.len(), num_keys as u64);
        for k in 0..num_keys {
            let value = map.get(&k.to_string()).unwrap();
            assert!(value % 1000 < 16, "{value}");
        }
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn read_during_resize() {
        let num_readers = 4;
        let num_stable = 256;
        let map: Arc<ConcurrentMap<usize>> = Arc::new(
            ConcurrentMap::builder()
                .concurrency(1)
                .bucket_number(2)
                .build()
                .unwrap(),
        );
        for i in 0..num_stable {
            assert_eq!(map.put(format!("stable-{i}"), i), Ok(true));
        }

        let done = Arc::new(AtomicBool::new(false));
        let barrier = Arc::new(Barrier::new(num_readers + 1));
        let mut readers = Vec::with_capacity(num_readers);
        for _ in 0..num_readers {
            let barrier_clone = barrier.clone();
            let done_clone = done.clone();
            let map_clone = map.clone();
            readers.push(thread::spawn(move || {
                barrier_clone.wait();
                while !done_clone.load(Acquire) {
                    for i in 0..num_stable {
                        assert_eq!(map_clone.get(&format!("stable-{i}")), Some(i));
                    }
                }
            }));
        }

        barrier.wait();
        for round in 0..4 {
            for i in 0..8192_usize {
                assert_eq!(map.put(format!("churn-{i}"), i + round), Ok(true));
            }
            for i in 0..8192 {
                assert!(map.delete(&format!("churn-{i}")));
            }
        }
        done.store(true, Release);
        for reader in readers {
            assert!(reader.join().is_ok());
        }

        assert_eq!(map.len(), num_stable as u64);
        assert_eq!(map.redistribution_faults(), 0);
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn grow_and_shrink() {
        let map: ConcurrentMap<usize> = ConcurrentMap::new(1).unwrap();
        for i in 0..20_000_usize {
            assert_eq!(map.put(i.to_string(), i), Ok(true));
        }
        for i in 100..20_000 {
            assert!(map.delete(&i.to_string()));
        }
        for i in 100..20_000 {
            assert!(!map.delete(&i.to_string()));
            assert!(!map.contains(&i.to_string()));
        }
        for i in 0..100 {
            assert_eq!(map.get(&i.to_string()), Some(i));
        }
        assert_eq!(map.len(), 100);
        assert_eq!(map.redistribution_faults(), 0);
    }

    #[derive(Clone)]
    struct Panicking;

    impl Redistributor for Panicking {
        fn update_threshold(&mut self, _pair_total: u64, _bucket_count: usize) {}

        fn check_bucket_status(&mut self, pair_total: u64, _bucket_size: u64) -> BucketStatus {
            if pair_total % 2 == 0 {
                BucketStatus::Overweight
            } else {
                BucketStatus::Normal
            }
        }

        fn redistribute<V: 'static>(
            &mut self,
            status: BucketStatus,
            _array: &BucketArray<V>,
            _guard: &Guard,
        ) -> Result<Option<BucketArray<V>>> {
            assert_eq!(status, BucketStatus::Normal, "cannot grow");
            Ok(None)
        }
    }

    #[test]
    fn faulty_redistributor() {
        let map: ConcurrentMap<usize, Panicking> =
            ConcurrentMap::with_redistributor(2, Panicking).unwrap();
        for i in 0..8_usize {
            assert_eq!(map.put(i.to_string(), i), Ok(true));
        }
        for i in 0..8 {
            assert_eq!(map.get(&i.to_string()), Some(i));
        }
        assert_eq!(map.len(), 8);
        assert!(map.redistribution_faults() > 0);
        assert!(matches!(
            map.last_redistribution_error(),
            Some(Error::Redistribution(_))
        ));
    }

    #[derive(Clone)]
    struct Flaky(DefaultRedistributor);

    impl Redistributor for Flaky {
        fn update_threshold(&mut self, pair_total: u64, bucket_count: usize) {
            self.0.update_threshold(pair_total, bucket_count);
        }

        fn check_bucket_status(&mut self, pair_total: u64, bucket_size: u64) -> BucketStatus {
            self.0.check_bucket_status(pair_total, bucket_size)
        }

        fn redistribute<V: 'static>(
            &mut self,
            status: BucketStatus,
            array: &BucketArray<V>,
            guard: &Guard,
        ) -> Result<Option<BucketArray<V>>> {
            assert!(rand::random::<u8>() % 8 != 0);
            self.0.redistribute(status, array, guard)
        }
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn flaky_redistributor_sync() {
        let num_threads = 4;
        let workload_size = 4096;
        let map: Arc<ConcurrentMap<usize, Flaky>> = Arc::new(
            ConcurrentMap::with_redistributor(
                2,
                Flaky(DefaultRedistributor::default().with_bucket_max_size(2)),
            )
            .unwrap(),
        );
        let barrier = Arc::new(Barrier::new(num_threads));
        let mut threads = Vec::with_capacity(num_threads);
        for thread_id in 0..num_threads {
            let barrier_clone = barrier.clone();
            let map_clone = map.clone();
            threads.push(thread::spawn(move || {
                barrier_clone.wait();
                let keys = (0..workload_size).map(|i| format!("{thread_id}-{i}"));
                for (i, key) in keys.clone().enumerate() {
                    assert_eq!(map_clone.put(key, i), Ok(true));
                }
                for (i, key) in keys.enumerate() {
                    assert_eq!(map_clone.get(&key), Some(i));
                    if i % 2 == 0 {
                        assert!(map_clone.delete(&key));
                    }
                }
            }));
        }
        for thread in threads {
            assert!(thread.join().is_ok());
        }

        assert_eq!(map.len(), (num_threads * workload_size / 2) as u64);
        for thread_id in 0..num_threads {
            for i in 0..workload_size {
                let expected = (i % 2 == 1).then_some(i);
                assert_eq!(map.get(&format!("{thread_id}-{i}")), expected);
            }
        }
    }

    #[test]
    fn default_redistributor_limit() {
        let redistributor = DefaultRedistributor::default()
            .with_bucket_max_size(0)
            .with_max_bucket_number(4);
        let map = ConcurrentMap::<usize>::builder()
            .concurrency(1)
            .bucket_number(4)
            .redistributor(redistributor)
            .build()
            .unwrap();
        for i in 0..64_usize {
            assert_eq!(map.put(i.to_string(), i), Ok(true));
        }
        assert_eq!(map.len(), 64);
        assert!(map.redistribution_faults() > 0);
        for i in 0..64 {
            assert_eq!(map.get(&i.to_string()), Some(i));
        }
    }

    #[test]
    fn debug() {
        let map: ConcurrentMap<usize> = ConcurrentMap::new(2).unwrap();
        assert_eq!(map.put("a", 1), Ok(true));
        let formatted = format!("{map:?}");
        assert!(formatted.starts_with("ConcurrentMap { len: 1"), "{formatted}");
        assert_eq!(map.get("a"), Some(1));
        assert!(!map.contains("b"));
    }
}

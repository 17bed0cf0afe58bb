use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Which backend a test runs against.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// A fresh in-memory store.
    Memory,
    /// A fresh in-memory store seeded with the example voters.
    Voters,
    /// A fresh MongoDB database, dropped when the test ends.
    Mongo,
}

/// Transform an asynchronous test into a synchronous one and inject dependencies.
///
/// By default every test gets a fresh in-memory backend. Injectable
/// dependencies are [`rocket::local::asynchronous::Client`], wired to that
/// backend, and [`crate::store::memory::MemoryStore`], a handle on the same
/// backend for seeding data and inspecting what the test wrote.
///
/// `#[backend_test(voters)]` seeds the example voters and their devices first.
///
/// `#[backend_test(mongo)]` instead runs against a randomly named MongoDB
/// database, which is dropped regardless of how the test terminates.
/// Injectable dependencies are then `Client` and [`mongodb::Database`].
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    let mode = match parse_macro_input!(args as Option<Ident>) {
        None => Mode::Memory,
        Some(arg) if arg == "voters" => Mode::Voters,
        Some(arg) if arg == "mongo" => Mode::Mongo,
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `voters`, `mongo` or no argument")
                .into_compile_error()
                .into();
        }
    };

    // Extract the arguments to inject and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone(), mode) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let init_logging = quote! {
        log4rs_test_utils::test_logging::init_logging_once_for(
            ["wevote_friends"],
            None,
            None,
        );
    };

    // Rewrite the test function.
    if mode == Mode::Mongo {
        return quote! {
            #[test]
            fn #name() {
                /// Test setup.
                async fn setup() -> (rocket::local::asynchronous::Client, mongodb::Database) {
                    #init_logging

                    let db = crate::config::test_database().await;
                    let backend = crate::store::Backend::mongo(
                        &db,
                        crate::store::outbound::examples::offline_sns_client(),
                        crate::store::outbound::EmailTopic::example(),
                    );
                    let rocket = crate::rocket_for_backend(crate::Config::example(), backend);
                    let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                        .await
                        .unwrap();

                    (rocket_client, db)
                }

                /// The test itself.
                #item_fn

                /// Test cleanup.
                async fn cleanup(db: mongodb::Database) {
                    db.drop(None).await.unwrap();
                }

                // Create an async runtime. We need a separate one for inside and
                // outside the `catch_unwind`.
                let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                    .thread_name("test-setup-cleanup")
                    .worker_threads(1)
                    .enable_all()
                    .build()
                    .unwrap();
                let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                    .thread_name("rocket-worker-test-thread")
                    .worker_threads(1)
                    .enable_all()
                    .build()
                    .unwrap();

                // Run the setup.
                let (rocket_client, db) = outer_runtime.block_on(setup());

                // Run the test, catching any panics.
                // Use mutexes to safely transfer `!UnwindSafe` data.
                let client_mutex = std::sync::Mutex::new(rocket_client);
                let db_mutex = std::sync::Mutex::new(db.clone());
                let runtime_mutex = std::sync::Mutex::new(inner_runtime);
                let result = std::panic::catch_unwind(|| {
                    #[allow(unused_variables)]
                    let rocket_client = client_mutex.into_inner().unwrap();
                    #[allow(unused_variables)]
                    let db = db_mutex.into_inner().unwrap();
                    let runtime = runtime_mutex.into_inner().unwrap();

                    runtime.block_on(#new_name(#(#test_args),*));
                });

                // Run the cleanup.
                outer_runtime.block_on(cleanup(db));

                // If the test panicked, re-raise the panic.
                if let Err(cause) = result {
                    std::panic::panic_any(cause);
                }
            }
        }
        .into();
    }

    let maybe_seed = match mode {
        Mode::Voters => quote! {
            store.seed_example_voters();
        },
        _ => quote! {},
    };

    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::store::memory::MemoryStore,
            ) {
                #init_logging

                let store = crate::store::memory::MemoryStore::default();
                #maybe_seed

                let rocket = crate::rocket_for_backend(crate::Config::example(), store.backend());
                let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                    .await
                    .unwrap();

                (rocket_client, store)
            }

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, store) = setup().await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject
/// parameters unknown to or unavailable in the given mode.
fn check_sig(sig: Signature, mode: Mode) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_store = false;
    let mut has_db = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                // Valid as the last path segment for any type is itself.
                let type_ident = &type_path.path.segments.last().unwrap().ident;
                if type_ident == "Client" {
                    if has_client {
                        return Err(syn::Error::new(
                            input.span(),
                            "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                        ));
                    }
                    has_client = true;
                    args.push(quote! { rocket_client });
                    continue;
                } else if type_ident == "MemoryStore" && mode != Mode::Mongo {
                    if has_store {
                        return Err(syn::Error::new(
                            input.span(),
                            "Test cannot accept more than one `MemoryStore`",
                        ));
                    }
                    has_store = true;
                    args.push(quote! { store.clone() });
                    continue;
                } else if type_ident == "Database" && mode == Mode::Mongo {
                    if has_db {
                        return Err(syn::Error::new(
                            input.span(),
                            "Test cannot accept more than one `mongodb::Database`",
                        ));
                    }
                    has_db = true;
                    args.push(quote! { db.clone() });
                    continue;
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            match mode {
                Mode::Mongo => "Expected one of `client_ident: Client` or `db_ident: Database`",
                _ => "Expected one of `client_ident: Client` or `store_ident: MemoryStore`",
            },
        ));
    }

    Ok(args)
}

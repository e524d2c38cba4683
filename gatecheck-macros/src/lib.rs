//! Proc macros for gatecheck
//!
//! Provides `#[gatecheck::test]` attribute macro for proxy workflow tests.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{FnArg, ItemFn, Pat, PatType, ReturnType};

/// Attribute macro for proxy workflow tests.
///
/// Creates a `Harness` from the environment and lends it to your test
/// function. Teardown always runs, whether the test passes, fails or
/// panics.
///
/// # Example
///
/// ```ignore
/// use gatecheck::Harness;
///
/// #[gatecheck::test]
/// async fn test_https_outbound(harness: Harness) {
///     harness.prepare("4051", "29837").await.unwrap();
///     harness.test_outbound_processing(&https_outbound).await.unwrap();
/// }
/// ```
///
/// # With Result Return Type
///
/// ```ignore
/// #[gatecheck::test]
/// async fn test_with_result(harness: Harness) -> Result<(), gatecheck::HarnessError> {
///     harness.prepare("4051", "29837").await?;
///     Ok(())
/// }
/// ```
///
/// The error type only needs to implement `Display`.
///
/// # What it does
///
/// The macro transforms your test function to:
/// 1. Create a `Harness` with `Harness::from_env()`
/// 2. Run your test with `&mut` access to it, catching panics
/// 3. Run `teardown()`
/// 4. On failure: print the diagnostics and fail the test
#[proc_macro_attribute]
pub fn test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input_fn = syn::parse_macro_input!(item as ItemFn);
    test_impl(&input_fn).into()
}

/// Check if a function has a parameter named "harness"
fn has_harness_param(input_fn: &ItemFn) -> bool {
    input_fn.sig.inputs.iter().any(|arg| {
        if let FnArg::Typed(PatType { pat, .. }) = arg {
            if let Pat::Ident(ident) = pat.as_ref() {
                return ident.ident == "harness";
            }
        }
        false
    })
}

/// Check if a function has an explicit return type (e.g., `-> Result<...>`)
fn has_result_return(input_fn: &ItemFn) -> bool {
    matches!(&input_fn.sig.output, ReturnType::Type(..))
}

/// Inner implementation that works with `proc_macro2` types for testability
fn test_impl(input_fn: &ItemFn) -> proc_macro2::TokenStream {
    let fn_name = &input_fn.sig.ident;
    let fn_block = &input_fn.block;
    let fn_vis = &input_fn.vis;
    let fn_attrs = &input_fn.attrs;
    let fn_output = &input_fn.sig.output;

    if !has_harness_param(input_fn) {
        // No harness parameter - just wrap with tokio::test
        return quote! {
            #(#fn_attrs)*
            #[tokio::test]
            #fn_vis async fn #fn_name() #fn_output {
                #fn_block
            }
        };
    }

    let body_fn = format_ident!("__gatecheck_{}", fn_name);

    // The body runs in its own fn so `?` sees the declared return type
    let check_result = if has_result_return(input_fn) {
        quote! {
            if let Err(e) = returned {
                eprintln!("{}", harness.diagnostics());
                panic!("test failed: {}", e);
            }
        }
    } else {
        quote! {
            let () = returned;
        }
    };

    quote! {
        #(#fn_attrs)*
        #[tokio::test]
        #fn_vis async fn #fn_name() {
            use gatecheck::__private::FutureExt;
            use std::panic::AssertUnwindSafe;

            async fn #body_fn(harness: &mut gatecheck::Harness) #fn_output #fn_block

            let mut harness = gatecheck::Harness::from_env()
                .unwrap_or_else(|e| panic!("Failed to create Harness: {}", e));

            // Run test and catch any panics
            let outcome = AssertUnwindSafe(#body_fn(&mut harness))
                .catch_unwind()
                .await;

            // Teardown never fails and always runs
            harness.teardown().await;

            match outcome {
                Ok(returned) => {
                    #check_result
                }
                Err(panic_info) => {
                    // Print diagnostics before re-panicking
                    eprintln!("{}", harness.diagnostics());
                    std::panic::resume_unwind(panic_info);
                }
            }
        }
    }
}
